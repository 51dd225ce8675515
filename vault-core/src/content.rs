use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::asset::AssetUrl;
use crate::error::ConfigError;

const BUILTIN_CONTENT: &str = include_str!("content.json");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamMember {
    pub id: String,
    pub name: String,
    pub designation: String,
    pub summary: String,
    pub image: AssetUrl,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub image_url: Option<AssetUrl>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Industry {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image: AssetUrl,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlogPost {
    pub id: u32,
    pub title: String,
    pub category: String,
    pub date: String,
    pub excerpt: String,
    pub image: AssetUrl,
}

/// Static site content and the images it declares.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContentStore {
    /// Hero and gallery images pages reference directly.
    pub featured: Vec<AssetUrl>,
    pub services: Vec<Service>,
    pub industries: Vec<Industry>,
    pub blog_posts: Vec<BlogPost>,
    pub team: Vec<TeamMember>,
}

impl ContentStore {
    /// Content shipped with the site.
    pub fn builtin() -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(BUILTIN_CONTENT)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Every image any page may render, in declaration order. Duplicates are
    /// kept; the synchronizer collapses them.
    pub fn all_asset_urls(&self) -> Vec<AssetUrl> {
        self.featured
            .iter()
            .chain(self.services.iter().filter_map(|s| s.image_url.as_ref()))
            .chain(self.industries.iter().map(|i| &i.image))
            .chain(self.blog_posts.iter().map(|b| &b.image))
            .chain(self.team.iter().map(|t| &t.image))
            .cloned()
            .collect()
    }

    pub fn blog_post(&self, id: u32) -> Option<&BlogPost> {
        self.blog_posts.iter().find(|post| post.id == id)
    }

    pub fn service(&self, id: &str) -> Option<&Service> {
        self.services.iter().find(|service| service.id == id)
    }
}
