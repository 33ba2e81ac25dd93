use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::Error;
use crate::geocode::Geocoder;
use crate::places::PlaceLookup;
use crate::presenter::Presenter;
use crate::types::{GeocodeResult, Place};
use log::{debug, error, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub const SEARCHING: &str = "Searching...";
pub const FAILURE: &str = "Couldn't find places for that destination.";

pub fn no_places_message(label: &str) -> String {
    format!("No notable nearby places found around {}.", label)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Searching,
    Success,
    Failed,
}

/// How a single call to `search` ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Blank query; nothing was sent.
    Ignored,
    Found(usize),
    NoPlaces,
    Failed,
    /// A newer search started before this one finished.
    Superseded,
}

#[derive(Debug, Clone, Copy)]
pub struct SearchSettings {
    pub radius_meters: u32,
    pub limit: u32,
    pub zoom: u8,
}

impl From<&Config> for SearchSettings {
    fn from(config: &Config) -> Self {
        SearchSettings {
            radius_meters: config.radius_meters(),
            limit: config.result_limit(),
            zoom: config.zoom,
        }
    }
}

/// One search attempt, identified by its pair of tokens.
#[derive(Clone)]
struct Generation {
    id: u64,
    geocode: CancelToken,
    places: CancelToken,
}

impl Generation {
    fn cancel(&self) {
        self.geocode.cancel();
        self.places.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.geocode.is_cancelled() || self.places.is_cancelled()
    }
}

/// A search whose generation is live but whose requests are not yet issued.
pub struct PendingSearch {
    generation: Generation,
    query: String,
}

impl PendingSearch {
    pub fn query(&self) -> &str {
        &self.query
    }
}

struct State {
    current: Option<Generation>,
    phase: Phase,
}

/// Runs geocode then place lookup for the latest query and pushes the
/// outcome to the presenter. Only the newest generation may touch the
/// presenter once its requests have been issued.
pub struct SearchOrchestrator {
    geocoder: Arc<dyn Geocoder>,
    places: Arc<dyn PlaceLookup>,
    presenter: Arc<dyn Presenter>,
    settings: SearchSettings,
    next_generation: AtomicU64,
    state: Mutex<State>,
}

impl SearchOrchestrator {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        places: Arc<dyn PlaceLookup>,
        presenter: Arc<dyn Presenter>,
        settings: SearchSettings,
    ) -> Self {
        SearchOrchestrator {
            geocoder,
            places,
            presenter,
            settings,
            next_generation: AtomicU64::new(1),
            state: Mutex::new(State {
                current: None,
                phase: Phase::Idle,
            }),
        }
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub async fn search(&self, query: &str) -> Outcome {
        match self.start(query) {
            Some(pending) => self.finish(pending).await,
            None => Outcome::Ignored,
        }
    }

    /// Opens a new generation for `query`, cancelling the previous one, and
    /// returns it for `finish`. Generations are ordered by calls to `start`,
    /// so callers that spawn `finish` must call this first, in input order.
    /// Returns `None` for a blank query.
    pub fn start(&self, query: &str) -> Option<PendingSearch> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        Some(PendingSearch {
            generation: self.begin(query),
            query: query.to_string(),
        })
    }

    pub async fn finish(&self, pending: PendingSearch) -> Outcome {
        let PendingSearch { generation, query } = pending;
        let query = query.as_str();

        let destination = match self.geocoder.geocode(query, &generation.geocode).await {
            Ok(destination) => destination,
            Err(e) => return self.fail(&generation, query, e),
        };
        let zoom = self.settings.zoom;
        if !self.apply(&generation, None, |p| {
            p.set_map_view(destination.coordinate, zoom)
        }) {
            return Outcome::Superseded;
        }

        let lookup = self.places.nearby(
            destination.coordinate,
            self.settings.radius_meters,
            self.settings.limit,
            &generation.places,
        );
        match lookup.await {
            Ok(places) => self.succeed(&generation, &destination, places),
            Err(e) => self.fail(&generation, query, e),
        }
    }

    /// Cancels whatever is in flight, e.g. on shutdown.
    pub fn cancel(&self) {
        let mut state = self.lock();
        if let Some(generation) = state.current.take() {
            generation.cancel();
        }
        state.phase = Phase::Idle;
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn begin(&self, query: &str) -> Generation {
        let generation = Generation {
            id: self.next_generation.fetch_add(1, Ordering::Relaxed),
            geocode: CancelToken::new(),
            places: CancelToken::new(),
        };
        let mut state = self.lock();
        if let Some(previous) = state.current.replace(generation.clone()) {
            debug!("Search {} superseded by {}", previous.id, generation.id);
            previous.cancel();
        }
        state.phase = Phase::Searching;
        info!("Search {} started for {:?}", generation.id, query);
        self.presenter.set_status(SEARCHING, false);
        generation
    }

    /// Runs `update` against the presenter only if `generation` is still the
    /// live one. The state lock is held throughout so a newer search cannot
    /// start halfway through an update.
    fn apply<F>(&self, generation: &Generation, phase: Option<Phase>, update: F) -> bool
    where
        F: FnOnce(&dyn Presenter),
    {
        let mut state = self.lock();
        let live = match &state.current {
            Some(current) => current.id == generation.id && !generation.is_cancelled(),
            None => false,
        };
        if !live {
            debug!("Ignoring late result from search {}", generation.id);
            return false;
        }
        update(self.presenter.as_ref());
        if let Some(phase) = phase {
            state.phase = phase;
        }
        true
    }

    fn succeed(
        &self,
        generation: &Generation,
        destination: &GeocodeResult,
        places: Vec<Place>,
    ) -> Outcome {
        let label = destination.label.as_str();
        let applied = self.apply(generation, Some(Phase::Success), |p| {
            p.clear_results();
            p.clear_markers();
            if places.is_empty() {
                p.show_no_results(&no_places_message(label));
            } else {
                p.render_places(label, &places);
                p.add_markers(&places);
                p.fit_to_markers();
            }
        });
        if !applied {
            return Outcome::Superseded;
        }
        info!(
            "Search {} found {} places around {}",
            generation.id,
            places.len(),
            label
        );
        if places.is_empty() {
            Outcome::NoPlaces
        } else {
            Outcome::Found(places.len())
        }
    }

    fn fail(&self, generation: &Generation, query: &str, e: Error) -> Outcome {
        if e.is_cancelled() {
            debug!("Search {} cancelled", generation.id);
            return Outcome::Superseded;
        }
        let applied = self.apply(generation, Some(Phase::Failed), |p| {
            p.set_status(FAILURE, true);
            p.clear_results();
        });
        if !applied {
            return Outcome::Superseded;
        }
        error!("Search {} for {:?} failed: {}", generation.id, query, e);
        Outcome::Failed
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Result;
    use crate::types::Coordinate;
    use futures::future::BoxFuture;
    use reqwest::StatusCode;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        MapView(Coordinate, u8),
        ClearMarkers,
        AddMarkers(Vec<String>),
        Fit,
        ClearResults,
        Render(String, Vec<String>),
        Status(String, bool),
        ClearStatus,
    }

    #[derive(Default)]
    pub(crate) struct RecordingPresenter {
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingPresenter {
        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    fn titles(places: &[Place]) -> Vec<String> {
        places.iter().map(|p| p.title.clone()).collect()
    }

    impl Presenter for RecordingPresenter {
        fn set_map_view(&self, center: Coordinate, zoom: u8) {
            self.push(Call::MapView(center, zoom));
        }
        fn clear_markers(&self) {
            self.push(Call::ClearMarkers);
        }
        fn add_markers(&self, places: &[Place]) {
            self.push(Call::AddMarkers(titles(places)));
        }
        fn fit_to_markers(&self) {
            self.push(Call::Fit);
        }
        fn clear_results(&self) {
            self.push(Call::ClearResults);
        }
        fn render_places(&self, label: &str, places: &[Place]) {
            self.push(Call::Render(label.to_string(), titles(places)));
        }
        fn set_status(&self, text: &str, is_error: bool) {
            self.push(Call::Status(text.to_string(), is_error));
        }
        fn clear_status(&self) {
            self.push(Call::ClearStatus);
        }
    }

    pub(crate) enum Reply {
        Found(f64),
        NotFound,
        Unavailable,
    }

    /// Geocoder keyed by query. Each destination's latitude doubles as the
    /// key for `FakePlaces`. `ignore_cancel` works as for `FakePlaces`.
    #[derive(Default)]
    pub(crate) struct FakeGeocoder {
        replies: HashMap<String, (Duration, Reply)>,
        ignore_cancel: bool,
        pub(crate) calls: AtomicUsize,
    }

    impl FakeGeocoder {
        pub(crate) fn with(mut self, query: &str, delay_ms: u64, reply: Reply) -> Self {
            self.replies
                .insert(query.to_string(), (Duration::from_millis(delay_ms), reply));
            self
        }

        fn ignoring_cancel(mut self) -> Self {
            self.ignore_cancel = true;
            self
        }
    }

    impl Geocoder for FakeGeocoder {
        fn geocode<'a>(
            &'a self,
            query: &'a str,
            cancel: &'a CancelToken,
        ) -> BoxFuture<'a, Result<GeocodeResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let (delay, reply) = self.replies.get(query).ok_or_else(|| Error::NotFound {
                    query: query.to_string(),
                })?;
                if self.ignore_cancel {
                    tokio::time::sleep(*delay).await;
                } else {
                    cancel.run(tokio::time::sleep(*delay)).await?;
                }
                match reply {
                    Reply::Found(latitude) => Ok(GeocodeResult {
                        coordinate: Coordinate::new(*latitude, 2.0),
                        label: query.to_string(),
                    }),
                    Reply::NotFound => Err(Error::NotFound {
                        query: query.to_string(),
                    }),
                    Reply::Unavailable => Err(Error::Transport {
                        service: "geocoder",
                        status: StatusCode::SERVICE_UNAVAILABLE,
                    }),
                }
            })
        }
    }

    /// Place lookup keyed by the center latitude. With `ignore_cancel` set it
    /// finishes even after its token fired, like a request that could not be
    /// aborted in time.
    #[derive(Default)]
    pub(crate) struct FakePlaces {
        replies: Vec<(f64, Duration, Option<Vec<&'static str>>)>,
        ignore_cancel: bool,
        pub(crate) calls: AtomicUsize,
    }

    impl FakePlaces {
        pub(crate) fn with(
            mut self,
            latitude: f64,
            delay_ms: u64,
            titles: Option<Vec<&'static str>>,
        ) -> Self {
            self.replies
                .push((latitude, Duration::from_millis(delay_ms), titles));
            self
        }

        fn ignoring_cancel(mut self) -> Self {
            self.ignore_cancel = true;
            self
        }
    }

    impl PlaceLookup for FakePlaces {
        fn nearby<'a>(
            &'a self,
            center: Coordinate,
            _radius_meters: u32,
            _limit: u32,
            cancel: &'a CancelToken,
        ) -> BoxFuture<'a, Result<Vec<Place>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let (_, delay, titles) = self
                    .replies
                    .iter()
                    .find(|(latitude, _, _)| *latitude == center.latitude)
                    .ok_or(Error::Decode("unexpected center".to_string()))?;
                if self.ignore_cancel {
                    tokio::time::sleep(*delay).await;
                } else {
                    cancel.run(tokio::time::sleep(*delay)).await?;
                }
                let titles = titles.as_ref().ok_or(Error::Transport {
                    service: "geosearch",
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                })?;
                Ok(titles
                    .iter()
                    .map(|title| Place {
                        title: title.to_string(),
                        extract: String::new(),
                        url: format!("https://en.wikipedia.org/wiki/{}", title),
                        image: None,
                        coordinate: center,
                    })
                    .collect())
            })
        }
    }

    fn settings() -> SearchSettings {
        SearchSettings {
            radius_meters: 10_000,
            limit: 6,
            zoom: 6,
        }
    }

    fn orchestrator(
        geocoder: FakeGeocoder,
        places: FakePlaces,
    ) -> (
        Arc<SearchOrchestrator>,
        Arc<FakeGeocoder>,
        Arc<FakePlaces>,
        Arc<RecordingPresenter>,
    ) {
        let geocoder = Arc::new(geocoder);
        let places = Arc::new(places);
        let presenter = Arc::new(RecordingPresenter::default());
        let orchestrator = Arc::new(SearchOrchestrator::new(
            geocoder.clone(),
            places.clone(),
            presenter.clone(),
            settings(),
        ));
        (orchestrator, geocoder, places, presenter)
    }

    fn status(text: &str) -> Call {
        Call::Status(text.to_string(), false)
    }

    fn strings(titles: &[&str]) -> Vec<String> {
        titles.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn blank_queries_never_search() {
        let (orchestrator, geocoder, places, presenter) =
            orchestrator(FakeGeocoder::default(), FakePlaces::default());
        for query in ["", "   ", "\t\n"] {
            assert_eq!(orchestrator.search(query).await, Outcome::Ignored);
        }
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(places.calls.load(Ordering::SeqCst), 0);
        assert!(presenter.calls().is_empty());
        assert_eq!(orchestrator.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_search_renders_in_order() {
        let (orchestrator, _, _, presenter) = orchestrator(
            FakeGeocoder::default().with("Paris", 5, Reply::Found(48.85)),
            FakePlaces::default().with(48.85, 5, Some(vec!["Louvre", "Pantheon", "Opera"])),
        );
        assert_eq!(orchestrator.search("  Paris ").await, Outcome::Found(3));
        assert_eq!(orchestrator.phase(), Phase::Success);
        assert_eq!(
            presenter.calls(),
            vec![
                status(SEARCHING),
                Call::MapView(Coordinate::new(48.85, 2.0), 6),
                Call::ClearResults,
                Call::ClearMarkers,
                Call::Render("Paris".to_string(), strings(&["Louvre", "Pantheon", "Opera"])),
                Call::AddMarkers(strings(&["Louvre", "Pantheon", "Opera"])),
                Call::Fit,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_lookup_shows_no_places_message() {
        let (orchestrator, _, _, presenter) = orchestrator(
            FakeGeocoder::default().with("Nowhere", 5, Reply::Found(10.0)),
            FakePlaces::default().with(10.0, 5, Some(vec![])),
        );
        assert_eq!(orchestrator.search("Nowhere").await, Outcome::NoPlaces);
        assert_eq!(
            presenter.calls(),
            vec![
                status(SEARCHING),
                Call::MapView(Coordinate::new(10.0, 2.0), 6),
                Call::ClearResults,
                Call::ClearMarkers,
                status("No notable nearby places found around Nowhere."),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn geocode_not_found_fails_without_map_update() {
        let (orchestrator, _, places, presenter) = orchestrator(
            FakeGeocoder::default().with("Atlantis", 5, Reply::NotFound),
            FakePlaces::default(),
        );
        assert_eq!(orchestrator.search("Atlantis").await, Outcome::Failed);
        assert_eq!(orchestrator.phase(), Phase::Failed);
        assert_eq!(places.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            presenter.calls(),
            vec![
                status(SEARCHING),
                Call::Status(FAILURE.to_string(), true),
                Call::ClearResults,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_fail_generically() {
        let (orchestrator, _, _, presenter) = orchestrator(
            FakeGeocoder::default()
                .with("Down", 5, Reply::Unavailable)
                .with("Rome", 5, Reply::Found(41.9)),
            FakePlaces::default().with(41.9, 5, None),
        );
        assert_eq!(orchestrator.search("Down").await, Outcome::Failed);
        assert_eq!(orchestrator.search("Rome").await, Outcome::Failed);
        let failures = presenter
            .calls()
            .into_iter()
            .filter(|call| *call == Call::Status(FAILURE.to_string(), true))
            .count();
        assert_eq!(failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_search_wins_while_older_is_in_place_lookup() {
        let (orchestrator, _, _, presenter) = orchestrator(
            FakeGeocoder::default()
                .with("Slowtown", 5, Reply::Found(1.0))
                .with("Fastville", 5, Reply::Found(2.0)),
            FakePlaces::default()
                .with(1.0, 1_000, Some(vec!["Old Mill"]))
                .with(2.0, 10, Some(vec!["New Bridge"])),
        );
        let first = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.search("Slowtown").await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = orchestrator.search("Fastville").await;

        assert_eq!(second, Outcome::Found(1));
        assert_eq!(first.await.unwrap(), Outcome::Superseded);
        let calls = presenter.calls();
        assert!(calls.contains(&Call::Render(
            "Fastville".to_string(),
            strings(&["New Bridge"])
        )));
        assert!(!calls
            .iter()
            .any(|call| matches!(call, Call::Render(label, _) if label == "Slowtown")));
        assert_eq!(calls.last(), Some(&Call::Fit));
    }

    #[tokio::test(start_paused = true)]
    async fn newer_search_wins_while_older_is_geocoding() {
        let (orchestrator, _, places, presenter) = orchestrator(
            FakeGeocoder::default()
                .with("Slowtown", 1_000, Reply::Found(1.0))
                .with("Fastville", 5, Reply::Found(2.0)),
            FakePlaces::default()
                .with(1.0, 5, Some(vec!["Old Mill"]))
                .with(2.0, 5, Some(vec!["New Bridge"])),
        );
        let first = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.search("Slowtown").await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(orchestrator.search("Fastville").await, Outcome::Found(1));
        assert_eq!(first.await.unwrap(), Outcome::Superseded);
        assert_eq!(places.calls.load(Ordering::SeqCst), 1);
        assert!(!presenter
            .calls()
            .contains(&Call::MapView(Coordinate::new(1.0, 2.0), 6)));
    }

    #[tokio::test(start_paused = true)]
    async fn late_completion_after_cancel_is_ignored() {
        let (orchestrator, _, _, presenter) = orchestrator(
            FakeGeocoder::default()
                .with("Slowtown", 5, Reply::Found(1.0))
                .with("Fastville", 5, Reply::Found(2.0)),
            FakePlaces::default()
                .with(1.0, 1_000, Some(vec!["Old Mill"]))
                .with(2.0, 10, Some(vec!["New Bridge"]))
                .ignoring_cancel(),
        );
        let first = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.search("Slowtown").await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(orchestrator.search("Fastville").await, Outcome::Found(1));
        // the stale lookup still runs to completion here
        assert_eq!(first.await.unwrap(), Outcome::Superseded);

        let renders: Vec<_> = presenter
            .calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Render(..)))
            .collect();
        assert_eq!(
            renders,
            vec![Call::Render("Fastville".to_string(), strings(&["New Bridge"]))]
        );
        assert_eq!(orchestrator.phase(), Phase::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_the_live_search() {
        let (orchestrator, _, _, presenter) = orchestrator(
            FakeGeocoder::default().with("Paris", 1_000, Reply::Found(48.85)),
            FakePlaces::default(),
        );
        let search = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.search("Paris").await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        orchestrator.cancel();
        assert_eq!(search.await.unwrap(), Outcome::Superseded);
        assert_eq!(presenter.calls(), vec![status(SEARCHING)]);
        assert_eq!(orchestrator.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_failure_after_newer_success_is_ignored() {
        let (orchestrator, _, _, presenter) = orchestrator(
            FakeGeocoder::default()
                .with("Slowtown", 1_000, Reply::Unavailable)
                .with("Fastville", 5, Reply::Found(2.0))
                .ignoring_cancel(),
            FakePlaces::default().with(2.0, 5, Some(vec!["New Bridge"])),
        );
        let first = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.search("Slowtown").await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(orchestrator.search("Fastville").await, Outcome::Found(1));
        // the stale geocode fails with a service error, not a cancellation
        assert_eq!(first.await.unwrap(), Outcome::Superseded);

        let calls = presenter.calls();
        assert_eq!(calls.last(), Some(&Call::Fit));
        assert!(!calls.contains(&Call::Status(FAILURE.to_string(), true)));
        assert_eq!(orchestrator.phase(), Phase::Success);
    }
}
