use crate::types::{Bounds, Coordinate, Place};
use log::{debug, error, info, warn};
use std::io::Write;
use std::sync::Mutex;

const FIT_PADDING: f64 = 0.25;
const FIT_MAX_ZOOM: u8 = 15;

/// Where search results end up: a result list, a status line and a map.
///
/// Calls are side effects only; the orchestrator never reads anything back.
pub trait Presenter: Send + Sync {
    fn set_map_view(&self, center: Coordinate, zoom: u8);
    fn clear_markers(&self);
    fn add_markers(&self, places: &[Place]);
    fn fit_to_markers(&self);
    fn clear_results(&self);
    fn render_places(&self, label: &str, places: &[Place]);
    fn set_status(&self, text: &str, is_error: bool);
    fn clear_status(&self);

    /// A search succeeded but found nothing; shown instead of a result list.
    fn show_no_results(&self, message: &str) {
        self.set_status(message, false);
    }
}

pub fn result_count(n: usize) -> String {
    format!("{} result{}", n, if n == 1 { "" } else { "s" })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Format {
    Cards,
    Json,
}

/// Writes cards (or a JSON array) to a terminal-like sink.
pub struct TerminalPresenter<W> {
    out: Mutex<W>,
    markers: Mutex<Vec<Place>>,
    format: Format,
}

impl<W: Write + Send> TerminalPresenter<W> {
    pub fn new(out: W, format: Format) -> Self {
        TerminalPresenter {
            out: Mutex::new(out),
            markers: Mutex::new(Vec::new()),
            format,
        }
    }

    fn write(&self, text: &str) {
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(out, "{}", text).and_then(|_| out.flush()) {
            error!("Unable to write to output: {}", e);
        }
    }

    /// Map and status lines are only printed alongside cards, so JSON output
    /// stays parseable.
    fn note(&self, text: &str) {
        match self.format {
            Format::Cards => self.write(text),
            Format::Json => info!("{}", text),
        }
    }

    fn markers(&self) -> std::sync::MutexGuard<'_, Vec<Place>> {
        match self.markers.lock() {
            Ok(markers) => markers,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn card(index: usize, place: &Place) -> String {
    let extract = if place.extract.is_empty() {
        "No description available."
    } else {
        place.extract.as_str()
    };
    let mut card = format!(
        "[{}] {}\n    {}\n    Open on Wikipedia: {}",
        index + 1,
        place.title,
        extract,
        place.url
    );
    if let Some(image) = &place.image {
        card.push_str(&format!("\n    Image: {}", image));
    }
    card
}

impl<W: Write + Send> Presenter for TerminalPresenter<W> {
    fn set_map_view(&self, center: Coordinate, zoom: u8) {
        self.note(&format!(
            "Map centered on {:.5}, {:.5} (zoom {})",
            center.latitude, center.longitude, zoom
        ));
    }

    fn clear_markers(&self) {
        self.markers().clear();
    }

    fn add_markers(&self, places: &[Place]) {
        let mut markers = self.markers();
        for place in places {
            debug!(
                "Marker {} at {}, {}",
                place.title, place.coordinate.latitude, place.coordinate.longitude
            );
            markers.push(place.clone());
        }
    }

    fn fit_to_markers(&self) {
        let bounds = match Bounds::around(&self.markers()) {
            Some(bounds) => bounds.pad(FIT_PADDING),
            None => return,
        };
        self.note(&format!(
            "Map fit to {:.5}, {:.5} .. {:.5}, {:.5} (max zoom {})",
            bounds.south_west.latitude,
            bounds.south_west.longitude,
            bounds.north_east.latitude,
            bounds.north_east.longitude,
            FIT_MAX_ZOOM
        ));
    }

    fn clear_results(&self) {
        debug!("Clearing results");
    }

    fn render_places(&self, label: &str, places: &[Place]) {
        self.clear_results();
        if label.is_empty() {
            self.clear_status();
        } else {
            self.set_status(&format!("Showing places around {}", label), false);
        }
        match self.format {
            Format::Cards => {
                let mut text = result_count(places.len());
                for (index, place) in places.iter().enumerate() {
                    text.push('\n');
                    text.push_str(&card(index, place));
                }
                self.write(&text);
            }
            Format::Json => match serde_json::to_string(places) {
                Ok(json) => self.write(&json),
                Err(e) => error!("Unable to serialize places: {}", e),
            },
        }
    }

    fn set_status(&self, text: &str, is_error: bool) {
        if is_error {
            warn!("{}", text);
        }
        if text.is_empty() {
            return;
        }
        match (self.format, is_error) {
            (Format::Cards, true) => self.write(&format!("error: {}", text)),
            (Format::Cards, false) => self.write(text),
            (Format::Json, false) => info!("{}", text),
            (Format::Json, true) => {}
        }
    }

    fn clear_status(&self) {
        debug!("Clearing status");
    }

    fn show_no_results(&self, message: &str) {
        self.set_status(message, false);
        if self.format == Format::Json {
            self.write("[]");
        }
    }
}
