//! Runtime configuration.
//!
//! Everything has a built-in default, so the monitor runs with no config
//! file at all. A YAML file passed with `--config` overrides any subset of
//! the fields:
//!
//! ```yaml
//! scrape_interval_secs: 1800
//! source_timeout_secs: 120
//! region_hint: Iran
//! extra_locations:
//!   - { name: minab, latitude: 27.1467, longitude: 57.0801 }
//! geocoder:
//!   enabled: false
//! ```
//!
//! Listing `sources` or `aggregators` replaces the corresponding default list
//! entirely.

use crate::classifier::KeywordClassifier;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::gateway::Gateway;
use crate::gazetteer::{
    GeoResolver, GeocodeError, Gazetteer, KnownLocation, NoopResolver, NominatimResolver,
    default_locations,
};
use crate::scrapers::{ScrapeContext, Source, SourceStrategy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("failed to build geocoder: {0}")]
    Geocoder(#[from] GeocodeError),
}

/// A feed-first or listing-only outlet. Sources with a `feed_url` are
/// scraped feed-first.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SourceConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub listing_url: String,
    pub base_url: String,
    #[serde(default)]
    pub feed_url: Option<String>,
}

/// A source made of several search feeds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AggregatorConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub feeds: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub user_agent: String,
    pub min_delay_ms: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: NominatimResolver::DEFAULT_ENDPOINT.to_string(),
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            min_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub sources: Vec<SourceConfig>,
    pub aggregators: Vec<AggregatorConfig>,
    pub conflict_keywords: Vec<String>,
    pub region_keywords: Vec<String>,
    /// Appended to external geocoder queries, e.g. `"Minab, Iran"`.
    pub region_hint: String,
    pub extra_locations: Vec<KnownLocation>,
    pub scrape_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub source_timeout_secs: Option<u64>,
    pub geocoder: GeocoderConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            aggregators: default_aggregators(),
            conflict_keywords: to_strings(CONFLICT_KEYWORDS),
            region_keywords: to_strings(REGION_KEYWORDS),
            region_hint: "Iran".to_string(),
            extra_locations: Vec::new(),
            scrape_interval_secs: 3600,
            request_timeout_secs: 30,
            source_timeout_secs: None,
            geocoder: GeocoderConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Load from a YAML file, or the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                info!(path = %path.display(), "Loaded config file");
                Self::from_yaml(&raw)?
            }
            None => {
                debug!("No config file given; using defaults");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scrape_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "scrape_interval_secs must be positive".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        if self.source_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "source_timeout_secs must be positive when set".to_string(),
            ));
        }

        let ids = self
            .sources
            .iter()
            .map(|s| s.id.as_str())
            .chain(self.aggregators.iter().map(|a| a.id.as_str()));
        for id in ids {
            if id.trim().is_empty() {
                return Err(ConfigError::Invalid("source id must not be empty".to_string()));
            }
        }
        if let Some(aggregator) = self.aggregators.iter().find(|a| a.feeds.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "aggregator {} has no feeds",
                aggregator.id
            )));
        }
        Ok(())
    }

    pub fn scrape_interval(&self) -> Duration {
        Duration::from_secs(self.scrape_interval_secs)
    }

    /// Configured sources in registration order: outlets first, then
    /// aggregators.
    pub fn sources(&self) -> Vec<Source> {
        let outlets = self.sources.iter().map(|s| Source {
            id: s.id.clone(),
            name: s.name.clone(),
            description: s.description.clone(),
            strategy: match &s.feed_url {
                Some(feed_url) if !feed_url.trim().is_empty() => SourceStrategy::FeedFirst {
                    feed_url: feed_url.clone(),
                    listing_url: s.listing_url.clone(),
                    base_url: s.base_url.clone(),
                },
                _ => SourceStrategy::HtmlListing {
                    listing_url: s.listing_url.clone(),
                    base_url: s.base_url.clone(),
                },
            },
        });
        let aggregators = self.aggregators.iter().map(|a| Source {
            id: a.id.clone(),
            name: a.name.clone(),
            description: a.description.clone(),
            strategy: SourceStrategy::Aggregator {
                feeds: a.feeds.clone(),
            },
        });
        outlets.chain(aggregators).collect()
    }

    pub fn classifier(&self) -> KeywordClassifier {
        KeywordClassifier::new(&self.conflict_keywords, &self.region_keywords)
    }

    /// Static table (built-in plus `extra_locations`) over the configured
    /// external resolver.
    pub fn gazetteer(&self) -> Result<Gazetteer, GeocodeError> {
        let resolver: Arc<dyn GeoResolver> = if self.geocoder.enabled {
            Arc::new(NominatimResolver::new(
                &self.geocoder.endpoint,
                &self.geocoder.user_agent,
            )?)
        } else {
            info!("External geocoding disabled");
            Arc::new(NoopResolver)
        };

        let mut locations = default_locations();
        locations.extend(self.extra_locations.iter().cloned());
        Ok(Gazetteer::with_locations(
            locations,
            resolver,
            &self.region_hint,
            Duration::from_millis(self.geocoder.min_delay_ms),
        ))
    }

    /// Wire the production gateway: shared HTTP client, classifier,
    /// gazetteer and every configured source.
    pub fn build_gateway(&self) -> Result<Gateway, ConfigError> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(Duration::from_secs(
            self.request_timeout_secs,
        ))?);
        let ctx = ScrapeContext {
            fetcher,
            classifier: Arc::new(self.classifier()),
            gazetteer: Arc::new(self.gazetteer()?),
        };
        Ok(Gateway::new(self.sources(), ctx)
            .with_source_timeout(self.source_timeout_secs.map(Duration::from_secs)))
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn outlet(
    id: &str,
    name: &str,
    description: &str,
    listing_url: &str,
    base_url: &str,
    feed_url: Option<&str>,
) -> SourceConfig {
    SourceConfig {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        listing_url: listing_url.to_string(),
        base_url: base_url.to_string(),
        feed_url: feed_url.map(str::to_string),
    }
}

fn default_sources() -> Vec<SourceConfig> {
    vec![
        outlet(
            "aljazeera",
            "Al Jazeera",
            "Al Jazeera English: RSS feed + HTML fallback",
            "https://www.aljazeera.com/where/iran/",
            "https://www.aljazeera.com",
            Some("https://www.aljazeera.com/xml/rss/all.xml"),
        ),
        outlet(
            "vg",
            "VG",
            "VG Nyheter: Norwegian news, HTML scraping",
            "https://www.vg.no/nyheter/utenriks/",
            "https://www.vg.no",
            None,
        ),
        outlet(
            "bbc",
            "BBC News",
            "BBC News Middle East: RSS feed + HTML fallback",
            "https://www.bbc.com/news/topics/cwlw3xz047jt",
            "https://www.bbc.com",
            Some("https://feeds.bbci.co.uk/news/world/middle_east/rss.xml"),
        ),
        outlet(
            "reuters",
            "Reuters",
            "Reuters World/Middle East: HTML scraping",
            "https://www.reuters.com/world/middle-east/",
            "https://www.reuters.com",
            None,
        ),
        outlet(
            "apnews",
            "AP News",
            "Associated Press: Iran hub, HTML scraping",
            "https://apnews.com/hub/iran",
            "https://apnews.com",
            None,
        ),
        outlet(
            "cnn",
            "CNN",
            "CNN Middle East: RSS feed + HTML fallback",
            "https://edition.cnn.com/middleeast",
            "https://edition.cnn.com",
            Some("http://rss.cnn.com/rss/edition_meast.rss"),
        ),
    ]
}

fn google_news_feed(query: &str) -> String {
    format!("https://news.google.com/rss/search?q={query}+when:7d&hl=en-US&gl=US&ceid=US:en")
}

fn default_aggregators() -> Vec<AggregatorConfig> {
    vec![AggregatorConfig {
        id: "google_news".to_string(),
        name: "Google News".to_string(),
        description: "Google News RSS search aggregator: multiple keyword feeds".to_string(),
        feeds: [
            "Iran+strike+bombing+missile",
            "Iran+airstrike+killed+casualties",
            "Iran+war+attack+military+strike",
            "Tehran+Isfahan+missile+strike",
        ]
        .into_iter()
        .map(google_news_feed)
        .collect(),
    }]
}

#[rustfmt::skip]
const CONFLICT_KEYWORDS: &[&str] = &[
    "bomb", "bombing", "strike", "airstrike", "air strike",
    "missile", "explosion", "shelling", "artillery", "blast",
    "drone strike", "raid", "killed", "casualties",
    "offensive", "military operation",
    "attack", "attacked", "bombardment", "target", "targeted",
    "destroy", "destroyed", "combat", "battle",
    "cruise missile", "ballistic missile", "intercepted",
    "drone", "warplane", "fighter jet", "sortie",
    "warfare", "strikes", "bombings", "rockets", "rocket",
    "weapons", "munitions", "warhead", "detonation",
    "killing", "deaths", "dead", "fatalities",
];

#[rustfmt::skip]
const REGION_KEYWORDS: &[&str] = &[
    "iran", "iranian", "tehran", "isfahan", "tabriz", "shiraz", "mashhad",
    "ahvaz", "kermanshah", "qom", "karaj", "bushehr", "bandar abbas",
    "persian gulf", "strait of hormuz", "khuzestan", "kurdistan",
    "irgc", "revolutionary guard",
    "parchin", "natanz", "fordow", "arak",
    "abadan", "dezful", "khorramshahr", "hamadan",
    "rasht", "kerman", "yazd", "ardabil", "zahedan",
    "gorgan", "sari", "semnan", "birjand", "ilam",
    "sanandaj", "khorramabad",
    "persian", "islamic republic",
    "khamenei", "rouhani", "raisi",
    "quds force", "basij",
    "esfahan", "khoramshahr", "bandar-abbas",
    "chabahar", "bam", "bojnurd", "zanjan", "urmia",
];
