//! Typed form of the upstream `data.json` document.
//!
//! Site associations carry no type tag of their own. Which variant a record
//! is depends on how its site is declared in `siteMeta`, so items are decoded
//! through a loose intermediate form and resolved against that table.

use std::collections::BTreeMap;

use bangumi_core::types::{ItemType, Language, SiteType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Metadata for one external site, keyed by site name in the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteMeta {
    pub title: String,
    pub url_template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,
    #[serde(rename = "type")]
    pub site_type: SiteType,
}

/// A site the work is broadcast on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BroadcastSite {
    pub site: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Takes precedence over `id` when building links.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub begin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcast: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub regions: Vec<String>,
}

/// An information site (encyclopedias, databases).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoSite {
    pub site: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// A download site. `id` is the search keyword rather than a page id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSite {
    pub site: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SiteAssociation {
    Broadcast(BroadcastSite),
    Info(InfoSite),
    Resource(ResourceSite),
}

impl SiteAssociation {
    pub fn site(&self) -> &str {
        match self {
            Self::Broadcast(s) => &s.site,
            Self::Info(s) => &s.site,
            Self::Resource(s) => &s.site,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Broadcast(s) => s.id.as_deref(),
            Self::Info(s) => s.id.as_deref(),
            Self::Resource(s) => s.id.as_deref(),
        }
    }
}

/// One broadcast work.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub title: String,
    pub title_translate: BTreeMap<Language, Vec<String>>,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub lang: Language,
    pub official_site: String,
    pub begin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcast: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub sites: Vec<SiteAssociation>,
}

impl Item {
    /// Year from the first four characters of `begin`, if they are all digits.
    pub fn begin_year(&self) -> Option<i32> {
        let prefix = self.begin.get(..4)?;
        if !prefix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        prefix.parse().ok()
    }

    /// First association with the given site name, in declared order.
    pub fn site(&self, name: &str) -> Option<&SiteAssociation> {
        self.sites.iter().find(|s| s.site() == name)
    }

    /// Case-insensitive substring match against the title and every
    /// translation. `needle` must already be lowercased.
    pub(crate) fn title_contains(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self
                .title_translate
                .values()
                .flatten()
                .any(|t| t.to_lowercase().contains(needle))
    }
}

/// A complete fetched snapshot of the upstream document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDataset", rename_all = "camelCase")]
pub struct Dataset {
    site_meta: BTreeMap<String, SiteMeta>,
    items: Vec<Item>,
}

impl Dataset {
    pub fn new(site_meta: BTreeMap<String, SiteMeta>, items: Vec<Item>) -> Self {
        Self { site_meta, items }
    }

    pub fn site_meta(&self) -> &BTreeMap<String, SiteMeta> {
        &self.site_meta
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }
}

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("item {item:?}: broadcast site {site:?} has no begin date")]
    MissingBegin { item: String, site: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDataset {
    site_meta: BTreeMap<String, SiteMeta>,
    items: Vec<RawItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawItem {
    title: String,
    #[serde(default)]
    title_translate: BTreeMap<Language, Vec<String>>,
    #[serde(rename = "type")]
    item_type: ItemType,
    lang: Language,
    official_site: String,
    begin: String,
    #[serde(default)]
    broadcast: Option<String>,
    #[serde(default)]
    end: Option<String>,
    #[serde(default)]
    comment: Option<String>,
    sites: Vec<RawSite>,
}

#[derive(Deserialize)]
struct RawSite {
    site: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    begin: Option<String>,
    #[serde(default)]
    broadcast: Option<String>,
    #[serde(default)]
    end: Option<String>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    regions: Vec<String>,
}

impl RawSite {
    fn resolve(
        self,
        item_title: &str,
        site_meta: &BTreeMap<String, SiteMeta>,
    ) -> Result<SiteAssociation, DatasetError> {
        // Undeclared sites fall back to the shape of the record.
        let site_type = match site_meta.get(&self.site) {
            Some(meta) => meta.site_type,
            None if self.begin.is_some() => SiteType::Onair,
            None => SiteType::Info,
        };

        Ok(match site_type {
            SiteType::Onair => {
                let begin = self.begin.ok_or_else(|| DatasetError::MissingBegin {
                    item: item_title.to_string(),
                    site: self.site.clone(),
                })?;
                SiteAssociation::Broadcast(BroadcastSite {
                    site: self.site,
                    id: self.id,
                    url: self.url,
                    begin,
                    broadcast: self.broadcast,
                    end: self.end,
                    comment: self.comment,
                    regions: self.regions,
                })
            }
            SiteType::Info => SiteAssociation::Info(InfoSite {
                site: self.site,
                id: self.id,
            }),
            SiteType::Resource => SiteAssociation::Resource(ResourceSite {
                site: self.site,
                id: self.id,
            }),
        })
    }
}

impl TryFrom<RawDataset> for Dataset {
    type Error = DatasetError;

    fn try_from(raw: RawDataset) -> Result<Self, Self::Error> {
        let site_meta = raw.site_meta;
        let items = raw
            .items
            .into_iter()
            .map(|item| {
                let sites = item
                    .sites
                    .into_iter()
                    .map(|s| s.resolve(&item.title, &site_meta))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Item {
                    title: item.title,
                    title_translate: item.title_translate,
                    item_type: item.item_type,
                    lang: item.lang,
                    official_site: item.official_site,
                    begin: item.begin,
                    broadcast: item.broadcast,
                    end: item.end,
                    comment: item.comment,
                    sites,
                })
            })
            .collect::<Result<Vec<_>, DatasetError>>()?;

        Ok(Self { site_meta, items })
    }
}
