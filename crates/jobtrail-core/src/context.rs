use std::sync::Arc;

use crate::clock::Clock;
use crate::config::{CrawlConfig, SiteProfile};
use crate::models::Site;
use crate::traits::CrawlStore;

/// Everything a crawl or maintenance pass needs besides the network.
#[derive(Clone)]
pub struct CrawlContext<S> {
    pub store: S,
    pub clock: Arc<dyn Clock>,
    pub config: CrawlConfig,
}

impl<S: CrawlStore> CrawlContext<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, config: CrawlConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn profile(&self, site: Site) -> &SiteProfile {
        self.config.profile(site)
    }
}
