//! Place-name to coordinate resolution.
//!
//! The [`Gazetteer`] answers `resolve(name)` in four steps, stopping at the
//! first hit:
//!
//! 1. exact match against the static table of known locations
//! 2. the process-lifetime cache, which also remembers failures
//! 3. substring containment against every static key, in either direction
//! 4. an external [`GeoResolver`] (Nominatim by default), serialized and
//!    rate-limited process-wide
//!
//! Static entries always win over the external resolver. Resolver failures
//! are logged and cached as unresolved so a bad name is never retried within
//! the same process.

use crate::models::Coordinates;
use crate::utils::title_case;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::MutexGuard;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, instrument, warn};

/// Built-in coordinates for the theatre: Iranian cities, facilities and
/// waters, plus Israeli, Iraqi, Qatari and Gulf locations.
const DEFAULT_LOCATIONS: &[(&str, f64, f64)] = &[
    // Iran
    ("tehran", 35.6892, 51.3890),
    ("isfahan", 32.6546, 51.6680),
    ("tabriz", 38.0800, 46.2919),
    ("shiraz", 29.5918, 52.5837),
    ("mashhad", 36.2605, 59.6168),
    ("ahvaz", 31.3183, 48.6706),
    ("kermanshah", 34.3142, 47.0650),
    ("qom", 34.6401, 50.8764),
    ("karaj", 35.8400, 50.9391),
    ("bushehr", 28.9234, 50.8203),
    ("bandar abbas", 27.1865, 56.2808),
    ("rasht", 37.2808, 49.5832),
    ("kerman", 30.2839, 57.0834),
    ("hamadan", 34.7990, 48.5150),
    ("arak", 34.0917, 49.6892),
    ("yazd", 31.8974, 54.3569),
    ("ardabil", 38.2498, 48.2933),
    ("sanandaj", 35.3219, 46.9862),
    ("zahedan", 29.4963, 60.8629),
    ("khorramabad", 33.4878, 48.3558),
    ("birjand", 32.8663, 59.2211),
    ("ilam", 33.6374, 46.4227),
    ("gorgan", 36.8427, 54.4344),
    ("sari", 36.5633, 53.0601),
    ("semnan", 35.5769, 53.3975),
    ("khuzestan", 31.4360, 49.0413),
    ("abadan", 30.3392, 48.3043),
    ("dezful", 32.3814, 48.4016),
    ("khorramshahr", 30.4265, 48.1714),
    ("persian gulf", 26.5000, 52.0000),
    ("strait of hormuz", 26.5667, 56.2500),
    ("parchin", 35.5200, 51.7700),
    ("natanz", 33.5131, 51.9164),
    ("fordow", 34.7089, 51.0375),
    // Israel
    ("tel aviv", 32.0853, 34.7818),
    ("haifa", 32.7940, 34.9896),
    ("nevatim afb", 31.2083, 34.6667),
    ("dimona", 31.0700, 35.2100),
    ("jerusalem", 31.7683, 35.2137),
    ("beer sheva", 31.2520, 34.7915),
    // Iraq (US bases)
    ("al asad air base", 33.7856, 42.4411),
    ("erbil", 36.1912, 44.0119),
    // Qatar
    ("al udeid air base", 25.1171, 51.3150),
    // Gulf
    ("gulf of oman", 25.5000, 57.0000),
];

/// One static gazetteer entry. Names are stored lowercase.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KnownLocation {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl KnownLocation {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    /// Title-cased name for display, e.g. `"Bandar Abbas"`.
    pub fn display_name(&self) -> String {
        title_case(&self.name)
    }
}

/// The built-in static table, in declaration order.
pub fn default_locations() -> Vec<KnownLocation> {
    DEFAULT_LOCATIONS
        .iter()
        .map(|(name, latitude, longitude)| KnownLocation {
            name: (*name).to_string(),
            latitude: *latitude,
            longitude: *longitude,
        })
        .collect()
}

/// Errors from an external geocoding service.
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("geocoding request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geocoder returned an invalid coordinate: {0}")]
    InvalidCoordinate(String),
}

/// External name-to-coordinate capability.
///
/// `Ok(None)` means the service answered but knows no such place; `Err` means
/// the service could not be asked. The gazetteer treats both as unresolved.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Option<Coordinates>, GeocodeError>;
}

/// A resolver that never resolves anything. Used when external geocoding is
/// disabled in configuration.
#[derive(Debug, Default)]
pub struct NoopResolver;

#[async_trait]
impl GeoResolver for NoopResolver {
    async fn resolve(&self, _query: &str) -> Result<Option<Coordinates>, GeocodeError> {
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// Geocoder backed by the OpenStreetMap Nominatim search API.
#[derive(Debug, Clone)]
pub struct NominatimResolver {
    client: Client,
    endpoint: String,
}

impl NominatimResolver {
    pub const DEFAULT_ENDPOINT: &'static str = "https://nominatim.openstreetmap.org/search";

    pub fn new(endpoint: &str, user_agent: &str) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl GeoResolver for NominatimResolver {
    #[instrument(level = "debug", skip(self))]
    async fn resolve(&self, query: &str) -> Result<Option<Coordinates>, GeocodeError> {
        let url = format!(
            "{}?q={}&format=json&limit=1",
            self.endpoint,
            urlencoding::encode(query)
        );

        let places: Vec<NominatimPlace> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let Some(place) = places.first() else {
            return Ok(None);
        };

        let latitude: f64 = place
            .lat
            .parse()
            .map_err(|_| GeocodeError::InvalidCoordinate(place.lat.clone()))?;
        let longitude: f64 = place
            .lon
            .parse()
            .map_err(|_| GeocodeError::InvalidCoordinate(place.lon.clone()))?;

        Ok(Some(Coordinates::new(latitude, longitude)))
    }
}

/// Enforces a minimum spacing between calls and serializes them.
///
/// Holding a [`RatePermit`] blocks every other caller; the spacing clock
/// restarts when the permit is dropped.
#[derive(Debug)]
pub struct RateLimiter {
    min_delay: Duration,
    last_call: tokio::sync::Mutex<Option<Instant>>,
}

/// Exclusive right to make one rate-limited call.
pub struct RatePermit<'a> {
    guard: MutexGuard<'a, Option<Instant>>,
}

impl Drop for RatePermit<'_> {
    fn drop(&mut self) {
        *self.guard = Some(Instant::now());
    }
}

impl RateLimiter {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_call: tokio::sync::Mutex::new(None),
        }
    }

    /// Wait for exclusive access and for the spacing since the last call.
    pub async fn acquire(&self) -> RatePermit<'_> {
        let guard = self.last_call.lock().await;
        if let Some(previous) = *guard {
            sleep_until(previous + self.min_delay).await;
        }
        RatePermit { guard }
    }
}

/// Static table + cache + external resolver.
pub struct Gazetteer {
    /// Registration order, used for exact and substring matching.
    known: Vec<KnownLocation>,
    /// Same entries sorted longest name first, used for text scanning.
    longest_first: Vec<KnownLocation>,
    cache: Mutex<HashMap<String, Option<Coordinates>>>,
    resolver: Arc<dyn GeoResolver>,
    limiter: RateLimiter,
    region_hint: String,
}

impl std::fmt::Debug for Gazetteer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gazetteer")
            .field("known", &self.known.len())
            .field("region_hint", &self.region_hint)
            .field("limiter", &self.limiter)
            .finish()
    }
}

impl Gazetteer {
    /// Create a gazetteer over the built-in table.
    pub fn new(resolver: Arc<dyn GeoResolver>, region_hint: &str, min_delay: Duration) -> Self {
        Self::with_locations(default_locations(), resolver, region_hint, min_delay)
    }

    /// Create a gazetteer over an explicit table. Names are lowercased and
    /// trimmed; a later entry with the same name replaces an earlier one.
    pub fn with_locations(
        locations: Vec<KnownLocation>,
        resolver: Arc<dyn GeoResolver>,
        region_hint: &str,
        min_delay: Duration,
    ) -> Self {
        let mut known: Vec<KnownLocation> = Vec::with_capacity(locations.len());
        for mut location in locations {
            location.name = normalize(&location.name);
            if location.name.is_empty() {
                continue;
            }
            match known.iter_mut().find(|k| k.name == location.name) {
                Some(existing) => *existing = location,
                None => known.push(location),
            }
        }

        let mut longest_first = known.clone();
        // Stable: equal lengths keep registration order.
        longest_first.sort_by(|a, b| b.name.len().cmp(&a.name.len()));

        Self {
            known,
            longest_first,
            cache: Mutex::new(HashMap::new()),
            resolver,
            limiter: RateLimiter::new(min_delay),
            region_hint: region_hint.trim().to_string(),
        }
    }

    /// Static entries, longest name first.
    pub fn known_longest_first(&self) -> &[KnownLocation] {
        &self.longest_first
    }

    /// Exact (case-insensitive, trimmed) lookup in the static table only.
    pub fn lookup_static(&self, name: &str) -> Option<Coordinates> {
        let normalized = normalize(name);
        self.known
            .iter()
            .find(|k| k.name == normalized)
            .map(KnownLocation::coordinates)
    }

    /// Number of cached lookups, positive and negative.
    #[cfg(test)]
    pub fn cached_len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Resolve a place name to coordinates. Never fails; `None` means the
    /// name could not be placed.
    pub async fn resolve(&self, name: &str) -> Option<Coordinates> {
        let normalized = normalize(name);
        if normalized.is_empty() {
            return None;
        }

        if let Some(coords) = self.lookup_static(&normalized) {
            return Some(coords);
        }

        if let Some(cached) = self.cached(&normalized) {
            return cached;
        }

        if let Some(known) = self
            .known
            .iter()
            .find(|k| normalized.contains(&k.name) || k.name.contains(&normalized))
        {
            let coords = known.coordinates();
            debug!(query = %normalized, matched = %known.name, "Resolved by containment");
            self.remember(&normalized, Some(coords));
            return Some(coords);
        }

        self.resolve_external(name.trim(), &normalized).await
    }

    async fn resolve_external(&self, name: &str, normalized: &str) -> Option<Coordinates> {
        let _permit = self.limiter.acquire().await;

        // Another task may have resolved the same name while we waited.
        if let Some(cached) = self.cached(normalized) {
            return cached;
        }

        let query = if self.region_hint.is_empty() {
            name.to_string()
        } else {
            format!("{}, {}", name, self.region_hint)
        };

        let outcome = match self.resolver.resolve(&query).await {
            Ok(Some(coords)) => {
                debug!(%query, lat = coords.latitude, lon = coords.longitude, "Geocoded");
                Some(coords)
            }
            Ok(None) => {
                debug!(%query, "Geocoder found no match");
                None
            }
            Err(e) => {
                warn!(%query, error = %e, "Geocoding failed");
                None
            }
        };

        self.remember(normalized, outcome);
        outcome
    }

    fn cached(&self, normalized: &str) -> Option<Option<Coordinates>> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(normalized)
            .copied()
    }

    fn remember(&self, normalized: &str, outcome: Option<Coordinates>) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalized.to_string(), outcome);
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Resolver stub that answers from a fixed table and counts calls.
    #[derive(Debug, Default)]
    pub struct FakeResolver {
        answers: HashMap<String, Coordinates>,
        failing: bool,
        pub calls: AtomicUsize,
        pub queries: Mutex<Vec<String>>,
    }

    impl FakeResolver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn answer(mut self, query: &str, coords: Coordinates) -> Self {
            self.answers.insert(query.to_string(), coords);
            self
        }

        pub fn failing() -> Self {
            Self {
                failing: true,
                ..Self::default()
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GeoResolver for FakeResolver {
        async fn resolve(&self, query: &str) -> Result<Option<Coordinates>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.to_string());
            if self.failing {
                return Err(GeocodeError::InvalidCoordinate("boom".to_string()));
            }
            Ok(self.answers.get(query).copied())
        }
    }

    /// Gazetteer over the default table with no rate-limit delay.
    pub fn gazetteer_with(resolver: Arc<FakeResolver>) -> Gazetteer {
        Gazetteer::new(resolver, "Iran", Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeResolver, gazetteer_with};
    use super::*;

    #[tokio::test]
    async fn test_known_names_never_hit_resolver() {
        let resolver = Arc::new(FakeResolver::new());
        let gazetteer = gazetteer_with(resolver.clone());

        for location in default_locations() {
            let coords = gazetteer.resolve(&location.name).await;
            assert_eq!(coords, Some(location.coordinates()), "{}", location.name);
        }
        assert_eq!(
            gazetteer.resolve("  TEHRAN ").await,
            Some(Coordinates::new(35.6892, 51.3890))
        );
        assert_eq!(resolver.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unresolvable_name_is_cached() {
        let resolver = Arc::new(FakeResolver::new());
        let gazetteer = gazetteer_with(resolver.clone());

        assert_eq!(gazetteer.resolve("Atlantis").await, None);
        assert_eq!(gazetteer.resolve("atlantis ").await, None);
        assert_eq!(resolver.call_count(), 1);
        assert_eq!(gazetteer.cached_len(), 1);
    }

    #[tokio::test]
    async fn test_resolver_failure_is_cached_as_unresolved() {
        let resolver = Arc::new(FakeResolver::failing());
        let gazetteer = gazetteer_with(resolver.clone());

        assert_eq!(gazetteer.resolve("Minab").await, None);
        assert_eq!(gazetteer.resolve("Minab").await, None);
        assert_eq!(resolver.call_count(), 1);
    }

    #[tokio::test]
    async fn test_external_query_carries_region_hint() {
        let minab = Coordinates::new(27.1467, 57.0801);
        let resolver = Arc::new(FakeResolver::new().answer("Minab, Iran", minab));
        let gazetteer = gazetteer_with(resolver.clone());

        assert_eq!(gazetteer.resolve("Minab").await, Some(minab));
        assert_eq!(gazetteer.resolve("minab").await, Some(minab));
        assert_eq!(resolver.call_count(), 1);
        assert_eq!(
            resolver.queries.lock().unwrap().as_slice(),
            ["Minab, Iran".to_string()]
        );
    }

    #[tokio::test]
    async fn test_substring_match_in_either_direction() {
        let resolver = Arc::new(FakeResolver::new());
        let gazetteer = gazetteer_with(resolver.clone());

        // Query contains a key.
        assert_eq!(
            gazetteer.resolve("Greater Tehran").await,
            Some(Coordinates::new(35.6892, 51.3890))
        );
        // Key contains the query.
        assert_eq!(
            gazetteer.resolve("Udeid").await,
            Some(Coordinates::new(25.1171, 51.3150))
        );
        assert_eq!(resolver.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_name_is_unresolved_without_lookup() {
        let resolver = Arc::new(FakeResolver::new());
        let gazetteer = gazetteer_with(resolver.clone());

        assert_eq!(gazetteer.resolve("   ").await, None);
        assert_eq!(resolver.call_count(), 0);
    }

    #[tokio::test]
    async fn test_extra_locations_override_and_extend() {
        let resolver = Arc::new(FakeResolver::new());
        let mut locations = default_locations();
        locations.push(KnownLocation {
            name: " Chabahar ".to_string(),
            latitude: 25.2919,
            longitude: 60.6430,
        });
        locations.push(KnownLocation {
            name: "tehran".to_string(),
            latitude: 1.0,
            longitude: 2.0,
        });
        let gazetteer = Gazetteer::with_locations(locations, resolver, "Iran", Duration::ZERO);

        assert_eq!(
            gazetteer.lookup_static("chabahar"),
            Some(Coordinates::new(25.2919, 60.6430))
        );
        assert_eq!(gazetteer.lookup_static("Tehran"), Some(Coordinates::new(1.0, 2.0)));
    }

    #[test]
    fn test_longest_first_ordering() {
        let gazetteer = gazetteer_with(Arc::new(FakeResolver::new()));
        let names: Vec<&str> = gazetteer
            .known_longest_first()
            .iter()
            .map(|k| k.name.as_str())
            .collect();
        let kermanshah = names.iter().position(|n| *n == "kermanshah").unwrap();
        let kerman = names.iter().position(|n| *n == "kerman").unwrap();
        assert!(kermanshah < kerman);
        assert_eq!(names[0], "al udeid air base");
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_calls_are_spaced() {
        let resolver = Arc::new(FakeResolver::new());
        let gazetteer = Gazetteer::new(resolver.clone(), "Iran", Duration::from_secs(1));

        let started = Instant::now();
        assert_eq!(gazetteer.resolve("Atlantis").await, None);
        assert_eq!(gazetteer.resolve("Lemuria").await, None);
        assert_eq!(gazetteer.resolve("Xyzzy").await, None);

        assert_eq!(resolver.call_count(), 3);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_lookups_of_one_name_call_resolver_once() {
        let minab = Coordinates::new(27.1467, 57.0801);
        let resolver = Arc::new(FakeResolver::new().answer("Minab, Iran", minab));
        let gazetteer = Gazetteer::new(resolver.clone(), "Iran", Duration::from_secs(1));

        let (a, b, c) = tokio::join!(
            gazetteer.resolve("Minab"),
            gazetteer.resolve("minab "),
            gazetteer.resolve("MINAB"),
        );

        assert_eq!((a, b, c), (Some(minab), Some(minab), Some(minab)));
        assert_eq!(resolver.call_count(), 1);
    }
}
