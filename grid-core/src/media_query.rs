use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSize {
    pub width: f32,
    pub height: f32,
}

impl ViewportSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaQueryError {
    #[error("empty media query")]
    Empty,

    #[error("unsupported media type {0:?}")]
    UnsupportedType(String),

    #[error("unsupported media feature {0:?}")]
    UnsupportedFeature(String),

    #[error("invalid length {value:?} for feature {feature:?}")]
    InvalidLength { feature: String, value: String },

    #[error("malformed media query {0:?}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    All,
    Screen,
    Print,
}

impl MediaType {
    fn parse(word: &str) -> Result<Self, MediaQueryError> {
        match word.to_ascii_lowercase().as_str() {
            "all" => Ok(MediaType::All),
            "screen" => Ok(MediaType::Screen),
            "print" => Ok(MediaType::Print),
            _ => Err(MediaQueryError::UnsupportedType(word.to_string())),
        }
    }

    fn applies_to(self, environment: MediaType) -> bool {
        self == MediaType::All || self == environment
    }
}

/// Feature bounds, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaFeature {
    MinWidth(f32),
    MaxWidth(f32),
    MinHeight(f32),
    MaxHeight(f32),
}

impl MediaFeature {
    fn parse(inner: &str) -> Result<Self, MediaQueryError> {
        let (name, value) = inner
            .split_once(':')
            .ok_or_else(|| MediaQueryError::UnsupportedFeature(inner.trim().to_string()))?;
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim();
        let px = parse_length(value).ok_or_else(|| MediaQueryError::InvalidLength {
            feature: name.clone(),
            value: value.to_string(),
        })?;

        match name.as_str() {
            "min-width" => Ok(MediaFeature::MinWidth(px)),
            "max-width" => Ok(MediaFeature::MaxWidth(px)),
            "min-height" => Ok(MediaFeature::MinHeight(px)),
            "max-height" => Ok(MediaFeature::MaxHeight(px)),
            _ => Err(MediaQueryError::UnsupportedFeature(name)),
        }
    }

    fn matches(&self, viewport: ViewportSize) -> bool {
        match *self {
            MediaFeature::MinWidth(min_width) => viewport.width >= min_width,
            MediaFeature::MaxWidth(max_width) => viewport.width <= max_width,
            MediaFeature::MinHeight(min_height) => viewport.height >= min_height,
            MediaFeature::MaxHeight(max_height) => viewport.height <= max_height,
        }
    }
}

impl fmt::Display for MediaFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaFeature::MinWidth(px) => write!(f, "(min-width: {px}px)"),
            MediaFeature::MaxWidth(px) => write!(f, "(max-width: {px}px)"),
            MediaFeature::MinHeight(px) => write!(f, "(min-height: {px}px)"),
            MediaFeature::MaxHeight(px) => write!(f, "(max-height: {px}px)"),
        }
    }
}

fn parse_length(value: &str) -> Option<f32> {
    let value = value.to_ascii_lowercase();
    let (number, scale) = if let Some(number) = value.strip_suffix("px") {
        (number, 1.0)
    } else if let Some(number) = value.strip_suffix("em") {
        (number, 16.0)
    } else {
        // Only a bare zero is a valid unitless length.
        (value.as_str(), 0.0)
    };
    let parsed: f32 = number.trim().parse().ok()?;
    if scale == 0.0 {
        return (parsed == 0.0).then_some(0.0);
    }
    (parsed >= 0.0).then_some(parsed * scale)
}

/// One alternative of a media query list: an optional media type and a
/// conjunction of features.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaQuery {
    media_type: MediaType,
    features: Vec<MediaFeature>,
}

impl MediaQuery {
    pub fn new() -> Self {
        Self {
            media_type: MediaType::All,
            features: Vec::new(),
        }
    }

    pub fn screen() -> Self {
        Self {
            media_type: MediaType::Screen,
            features: Vec::new(),
        }
    }

    pub fn min_width(mut self, width: u32) -> Self {
        self.features.push(MediaFeature::MinWidth(width as f32));
        self
    }

    pub fn max_width(mut self, width: u32) -> Self {
        self.features.push(MediaFeature::MaxWidth(width as f32));
        self
    }

    pub fn min_height(mut self, height: u32) -> Self {
        self.features.push(MediaFeature::MinHeight(height as f32));
        self
    }

    pub fn max_height(mut self, height: u32) -> Self {
        self.features.push(MediaFeature::MaxHeight(height as f32));
        self
    }

    pub fn matches(&self, viewport: ViewportSize, environment: MediaType) -> bool {
        self.media_type.applies_to(environment)
            && self.features.iter().all(|feature| feature.matches(viewport))
    }

    fn parse(source: &str) -> Result<Self, MediaQueryError> {
        let malformed = || MediaQueryError::Malformed(source.trim().to_string());
        let mut query = MediaQuery::new();
        let mut rest = source.trim();
        let mut expect_term = true;
        let mut first = true;

        while !rest.is_empty() {
            if let Some(group) = rest.strip_prefix('(') {
                if !expect_term {
                    return Err(malformed());
                }
                let end = group.find(')').ok_or_else(malformed)?;
                query.features.push(MediaFeature::parse(&group[..end])?);
                rest = group[end + 1..].trim_start();
                expect_term = false;
            } else {
                let end = rest
                    .find(|c: char| c.is_whitespace() || c == '(')
                    .unwrap_or(rest.len());
                let word = &rest[..end];
                rest = rest[end..].trim_start();

                if word.eq_ignore_ascii_case("and") {
                    if expect_term {
                        return Err(malformed());
                    }
                    expect_term = true;
                } else if word.eq_ignore_ascii_case("only") && first {
                    // `only` just hides the query from legacy engines.
                    continue;
                } else if first {
                    query.media_type = MediaType::parse(word)?;
                    expect_term = false;
                } else {
                    return Err(malformed());
                }
            }
            first = false;
        }

        if expect_term {
            return Err(malformed());
        }
        Ok(query)
    }
}

impl Default for MediaQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MediaQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        match self.media_type {
            MediaType::All if !self.features.is_empty() => {}
            MediaType::All => parts.push("all".to_string()),
            MediaType::Screen => parts.push("screen".to_string()),
            MediaType::Print => parts.push("print".to_string()),
        }
        parts.extend(self.features.iter().map(ToString::to_string));
        f.write_str(&parts.join(" and "))
    }
}

/// A comma-separated list of media queries; matches when any alternative does.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaQueryList {
    queries: Vec<MediaQuery>,
}

impl MediaQueryList {
    pub fn parse(source: &str) -> Result<Self, MediaQueryError> {
        if source.trim().is_empty() {
            return Err(MediaQueryError::Empty);
        }
        let queries = source
            .split(',')
            .map(MediaQuery::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { queries })
    }

    pub fn matches(&self, viewport: ViewportSize, environment: MediaType) -> bool {
        self.queries
            .iter()
            .any(|query| query.matches(viewport, environment))
    }
}

impl From<MediaQuery> for MediaQueryList {
    fn from(query: MediaQuery) -> Self {
        Self { queries: vec![query] }
    }
}

pub type SubscriptionId = u64;

pub type QueryCallback = Arc<dyn Fn() + Send + Sync>;

/// Callbacks attached to one query.
///
/// `setup` runs once: at registration, or right before the first `on_match`
/// when `defer_setup` is set.
#[derive(Clone, Default)]
pub struct QueryHandler {
    pub defer_setup: bool,
    pub setup: Option<QueryCallback>,
    pub on_match: Option<QueryCallback>,
    pub on_unmatch: Option<QueryCallback>,
}

impl QueryHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deferred_setup<F>(mut self, setup: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.defer_setup = true;
        self.setup = Some(Arc::new(setup));
        self
    }

    pub fn eager_setup<F>(mut self, setup: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.defer_setup = false;
        self.setup = Some(Arc::new(setup));
        self
    }

    pub fn on_match<F>(mut self, on_match: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_match = Some(Arc::new(on_match));
        self
    }

    pub fn on_unmatch<F>(mut self, on_unmatch: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_unmatch = Some(Arc::new(on_unmatch));
        self
    }
}

struct Subscription {
    id: SubscriptionId,
    source: String,
    query: MediaQueryList,
    handler: QueryHandler,
    matched: bool,
    setup_done: bool,
}

impl Subscription {
    fn take_setup(&mut self, pending: &mut Vec<QueryCallback>) {
        if !self.setup_done {
            self.setup_done = true;
            pending.extend(self.handler.setup.clone());
        }
    }
}

/// Tracks the viewport and the registered queries. Methods return the
/// callbacks to run instead of running them, so no lock is held while
/// handlers execute; see [`MediaQueries`].
pub struct MediaQueryManager {
    viewport: ViewportSize,
    environment: MediaType,
    cache: HashMap<String, bool>,
    subscriptions: Vec<Subscription>,
    next_id: SubscriptionId,
}

impl MediaQueryManager {
    pub fn new(viewport: ViewportSize) -> Self {
        Self {
            viewport,
            environment: MediaType::Screen,
            cache: HashMap::new(),
            subscriptions: Vec::new(),
            next_id: 1,
        }
    }

    pub fn viewport(&self) -> ViewportSize {
        self.viewport
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    fn evaluate(&mut self, source: &str, query: &MediaQueryList) -> bool {
        if let Some(&cached_result) = self.cache.get(source) {
            return cached_result;
        }

        let result = query.matches(self.viewport, self.environment);
        self.cache.insert(source.to_string(), result);
        result
    }

    /// Evaluates a query string against the current viewport.
    pub fn matches(&mut self, source: &str) -> Result<bool, MediaQueryError> {
        let query = MediaQueryList::parse(source)?;
        Ok(self.evaluate(source, &query))
    }

    #[must_use]
    pub fn register(
        &mut self,
        source: &str,
        handler: QueryHandler,
    ) -> Result<(SubscriptionId, Vec<QueryCallback>), MediaQueryError> {
        let query = MediaQueryList::parse(source)?;
        let matched = self.evaluate(source, &query);
        let id = self.next_id;
        self.next_id += 1;

        let mut subscription = Subscription {
            id,
            source: source.to_string(),
            query,
            handler,
            matched,
            setup_done: false,
        };

        let mut pending = Vec::new();
        if !subscription.handler.defer_setup || matched {
            subscription.take_setup(&mut pending);
        }
        if matched {
            pending.extend(subscription.handler.on_match.clone());
        }

        tracing::debug!(query = source, id, matched, "media query registered");
        self.subscriptions.push(subscription);
        Ok((id, pending))
    }

    #[must_use]
    pub fn unregister(&mut self, id: SubscriptionId) -> Vec<QueryCallback> {
        let Some(index) = self.subscriptions.iter().position(|s| s.id == id) else {
            return Vec::new();
        };
        let subscription = self.subscriptions.remove(index);
        tracing::debug!(query = %subscription.source, id, "media query unregistered");

        if subscription.matched {
            subscription.handler.on_unmatch.into_iter().collect()
        } else {
            Vec::new()
        }
    }

    #[must_use]
    pub fn set_viewport(&mut self, viewport: ViewportSize) -> Vec<QueryCallback> {
        if self.viewport == viewport {
            return Vec::new();
        }
        self.viewport = viewport;
        self.cache.clear(); // Invalidate cache when viewport changes

        let mut subscriptions = std::mem::take(&mut self.subscriptions);
        let mut pending = Vec::new();
        for subscription in &mut subscriptions {
            let now = self.evaluate(&subscription.source, &subscription.query);
            match (subscription.matched, now) {
                (false, true) => {
                    subscription.take_setup(&mut pending);
                    pending.extend(subscription.handler.on_match.clone());
                }
                (true, false) => pending.extend(subscription.handler.on_unmatch.clone()),
                _ => {}
            }
            subscription.matched = now;
        }
        self.subscriptions = subscriptions;
        pending
    }
}

/// Shared handle to a [`MediaQueryManager`] that runs handler callbacks after
/// releasing its lock, so handlers may call back into it.
#[derive(Clone)]
pub struct MediaQueries {
    manager: Arc<Mutex<MediaQueryManager>>,
}

impl MediaQueries {
    pub fn new(viewport: ViewportSize) -> Self {
        Self {
            manager: Arc::new(Mutex::new(MediaQueryManager::new(viewport))),
        }
    }

    fn manager(&self) -> MutexGuard<'_, MediaQueryManager> {
        self.manager.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run(callbacks: Vec<QueryCallback>) {
        for callback in callbacks {
            callback();
        }
    }

    pub fn register(
        &self,
        query: &str,
        handler: QueryHandler,
    ) -> Result<SubscriptionId, MediaQueryError> {
        let (id, pending) = self.manager().register(query, handler)?;
        Self::run(pending);
        Ok(id)
    }

    pub fn unregister(&self, id: SubscriptionId) {
        let pending = self.manager().unregister(id);
        Self::run(pending);
    }

    pub fn set_viewport(&self, viewport: ViewportSize) {
        let pending = self.manager().set_viewport(viewport);
        Self::run(pending);
    }

    pub fn viewport(&self) -> ViewportSize {
        self.manager().viewport()
    }

    pub fn matches(&self, query: &str) -> Result<bool, MediaQueryError> {
        self.manager().matches(query)
    }

    pub fn subscription_count(&self) -> usize {
        self.manager().subscription_count()
    }
}

// Helper functions for creating common media queries
pub fn mobile() -> MediaQuery {
    MediaQuery::new().max_width(767)
}

pub fn tablet() -> MediaQuery {
    MediaQuery::new().min_width(768).max_width(1023)
}

pub fn desktop() -> MediaQuery {
    MediaQuery::new().min_width(1024)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_parse_and_match() {
        let vp = ViewportSize::new(800.0, 600.0);
        let screen = MediaType::Screen;

        assert!(MediaQueryList::parse("(min-width: 768px)").unwrap().matches(vp, screen));
        assert!(MediaQueryList::parse("screen and (min-width:768px) and (max-width: 1023px)")
            .unwrap()
            .matches(vp, screen));
        assert!(MediaQueryList::parse("only screen and (max-width: 50em)").unwrap().matches(vp, screen));
        assert!(!MediaQueryList::parse("print and (min-width: 1px)").unwrap().matches(vp, screen));
        assert!(MediaQueryList::parse("(max-width: 10px), (min-height: 500px)")
            .unwrap()
            .matches(vp, screen));
        assert!(!MediaQueryList::parse("(max-width:1px)").unwrap().matches(vp, screen));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(MediaQueryList::parse(" "), Err(MediaQueryError::Empty));
        assert!(matches!(
            MediaQueryList::parse("(orientation: portrait)"),
            Err(MediaQueryError::InvalidLength { .. })
        ));
        assert!(matches!(
            MediaQueryList::parse("(min-resolution: 2px)"),
            Err(MediaQueryError::UnsupportedFeature(_))
        ));
        assert!(matches!(
            MediaQueryList::parse("tv and (min-width: 1px)"),
            Err(MediaQueryError::UnsupportedType(_))
        ));
        assert!(matches!(
            MediaQueryList::parse("(min-width: 1px) and"),
            Err(MediaQueryError::Malformed(_))
        ));
        assert!(matches!(
            MediaQueryList::parse("(min-width: 1px) (max-width: 2px)"),
            Err(MediaQueryError::Malformed(_))
        ));
    }

    #[test]
    fn test_builders_round_trip_through_display() {
        let query = tablet().to_string();
        assert_eq!(query, "(min-width: 768px) and (max-width: 1023px)");
        assert!(MediaQueryList::parse(&query).is_ok());
        assert_eq!(MediaQuery::new().to_string(), "all");
        assert!(MediaQueryList::parse(&mobile().to_string())
            .unwrap()
            .matches(ViewportSize::new(320.0, 480.0), MediaType::Screen));
    }

    #[test]
    fn test_deferred_setup_waits_for_first_match() {
        let queries = MediaQueries::new(ViewportSize::new(1200.0, 800.0));
        let (setups, setup) = counter();
        let (matches, on_match) = counter();
        let (unmatches, on_unmatch) = counter();

        queries
            .register(
                &mobile().to_string(),
                QueryHandler::new()
                    .deferred_setup(setup)
                    .on_match(on_match)
                    .on_unmatch(on_unmatch),
            )
            .unwrap();
        assert_eq!(setups.load(Ordering::SeqCst), 0);

        queries.set_viewport(ViewportSize::new(400.0, 800.0));
        queries.set_viewport(ViewportSize::new(1200.0, 800.0));
        queries.set_viewport(ViewportSize::new(500.0, 800.0));

        assert_eq!(setups.load(Ordering::SeqCst), 1);
        assert_eq!(matches.load(Ordering::SeqCst), 2);
        assert_eq!(unmatches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_matching_registration_fires_immediately() {
        let queries = MediaQueries::new(ViewportSize::new(400.0, 800.0));
        let (setups, setup) = counter();
        let (matches, on_match) = counter();

        queries
            .register("(max-width: 767px)", QueryHandler::new().deferred_setup(setup).on_match(on_match))
            .unwrap();

        assert_eq!(setups.load(Ordering::SeqCst), 1);
        assert_eq!(matches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_eager_setup_runs_without_match() {
        let queries = MediaQueries::new(ViewportSize::new(1200.0, 800.0));
        let (setups, setup) = counter();
        queries
            .register("(max-width: 767px)", QueryHandler::new().eager_setup(setup))
            .unwrap();
        assert_eq!(setups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_fires_unmatch_when_matched() {
        let queries = MediaQueries::new(ViewportSize::new(400.0, 800.0));
        let (unmatches, on_unmatch) = counter();
        let id = queries
            .register("(max-width: 767px)", QueryHandler::new().on_unmatch(on_unmatch))
            .unwrap();

        queries.unregister(id);
        queries.unregister(id);

        assert_eq!(unmatches.load(Ordering::SeqCst), 1);
        assert_eq!(queries.subscription_count(), 0);
    }

    #[test]
    fn test_handlers_may_reenter() {
        let queries = MediaQueries::new(ViewportSize::new(1200.0, 800.0));
        let inner = queries.clone();
        let id = Arc::new(Mutex::new(None));
        let id_for_handler = Arc::clone(&id);

        let registered = queries
            .register(
                "(max-width: 767px)",
                QueryHandler::new().on_match(move || {
                    if let Some(id) = *id_for_handler.lock().unwrap() {
                        inner.unregister(id);
                    }
                }),
            )
            .unwrap();
        *id.lock().unwrap() = Some(registered);

        queries.set_viewport(ViewportSize::new(400.0, 800.0));
        assert_eq!(queries.subscription_count(), 0);
    }
}
