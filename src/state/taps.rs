use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use uuid::Uuid;

/// Two taps on the same message closer than this count as a double tap.
pub const DOUBLE_TAP_WINDOW: Duration = Duration::from_millis(300);
/// Emoji toggled by a double tap.
pub const HEART: &str = "❤️";

const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapOutcome {
    /// First tap; wait to see whether a second one follows.
    Single,
    /// Second tap inside the window.
    Double,
}

/// Tracks the last tap per `(client, message)` pair.
#[derive(Debug)]
pub struct TapDebouncer {
    window: Duration,
    last_taps: DashMap<(String, Uuid), Instant>,
}

impl Default for TapDebouncer {
    fn default() -> Self {
        Self::new(DOUBLE_TAP_WINDOW)
    }
}

impl TapDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_taps: DashMap::new(),
        }
    }

    /// Record a tap at `at`. A double tap consumes both taps, so a third tap
    /// starts a new sequence.
    pub fn register(&self, client_id: &str, message_id: Uuid, at: Instant) -> TapOutcome {
        let key = (client_id.to_string(), message_id);
        let previous = self.last_taps.remove(&key).map(|(_, previous)| previous);

        match previous {
            Some(previous) if at.saturating_duration_since(previous) < self.window => {
                TapOutcome::Double
            }
            _ => {
                if self.last_taps.len() >= PRUNE_THRESHOLD {
                    let window = self.window;
                    self.last_taps
                        .retain(|_, seen| at.saturating_duration_since(*seen) < window);
                }
                self.last_taps.insert(key, at);
                TapOutcome::Single
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn second_tap_inside_window_is_a_double_tap() {
        let taps = TapDebouncer::default();
        let message = Uuid::new_v4();
        let start = Instant::now();

        assert_eq!(taps.register("client", message, start), TapOutcome::Single);
        assert_eq!(
            taps.register("client", message, start + Duration::from_millis(250)),
            TapOutcome::Double
        );
        assert_eq!(
            taps.register("client", message, start + Duration::from_millis(400)),
            TapOutcome::Single
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_taps_and_other_clients_do_not_combine() {
        let taps = TapDebouncer::default();
        let message = Uuid::new_v4();
        let start = Instant::now();

        assert_eq!(taps.register("a", message, start), TapOutcome::Single);
        assert_eq!(
            taps.register("b", message, start + Duration::from_millis(50)),
            TapOutcome::Single
        );
        assert_eq!(
            taps.register("a", message, start + Duration::from_millis(300)),
            TapOutcome::Single
        );
        assert_eq!(
            taps.register("a", Uuid::new_v4(), start + Duration::from_millis(310)),
            TapOutcome::Single
        );
    }
}
