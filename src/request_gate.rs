use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::security::fingerprint;

/// Why a request was turned away at the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Duplicate,
    Busy,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Busy => "busy",
        }
    }
}

pub enum GateDecision {
    Proceed(GatePermit),
    Skip(SkipReason),
}

impl std::fmt::Debug for GateDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proceed(permit) => write!(f, "Proceed({})", permit.signature),
            Self::Skip(reason) => write!(f, "Skip({})", reason.as_str()),
        }
    }
}

#[derive(Debug, Default)]
struct GateState {
    last_signature: String,
    last_signature_time: Option<Instant>,
    running: bool,
}

/// Process-wide dedup/serialization guard. One instance per process; clones share state.
#[derive(Debug, Clone)]
pub struct RequestGate {
    state: Arc<Mutex<GateState>>,
    window: Duration,
}

impl RequestGate {
    pub fn new(window: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState::default())),
            window,
        }
    }

    /// Never blocks: either hands out the single permit or says why not.
    pub fn acquire(&self, query: &str) -> GateDecision {
        let signature = fingerprint(query);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(finished_at) = state.last_signature_time {
            if state.last_signature == signature && finished_at.elapsed() < self.window {
                debug!("[Gate] duplicate within {:?}: '{}'", self.window, signature);
                return GateDecision::Skip(SkipReason::Duplicate);
            }
        }

        if state.running {
            info!("[Gate] busy, rejecting '{}'", signature);
            return GateDecision::Skip(SkipReason::Busy);
        }

        state.running = true;
        GateDecision::Proceed(GatePermit {
            state: Arc::clone(&self.state),
            signature,
        })
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.state.lock().map(|s| s.running).unwrap_or(false)
    }
}

/// Held for the duration of one execution. Dropping it, on any exit path,
/// frees the gate and records the completed call's fingerprint.
pub struct GatePermit {
    state: Arc<Mutex<GateState>>,
    signature: String,
}

impl GatePermit {
    pub fn signature(&self) -> &str {
        &self.signature
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.running = false;
        state.last_signature = std::mem::take(&mut self.signature);
        state.last_signature_time = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_identical_query_within_window_is_duplicate() {
        let gate = RequestGate::new(Duration::from_secs(4));
        match gate.acquire("Open platform X") {
            GateDecision::Proceed(permit) => drop(permit),
            other => panic!("expected proceed, got {:?}", other),
        }
        let decision = gate.acquire("  open PLATFORM x ");
        assert!(matches!(decision, GateDecision::Skip(SkipReason::Duplicate)));
    }

    #[test]
    fn concurrent_call_is_busy_and_does_not_touch_signature() {
        let gate = RequestGate::new(Duration::from_secs(4));
        let permit = match gate.acquire("first") {
            GateDecision::Proceed(p) => p,
            other => panic!("expected proceed, got {:?}", other),
        };
        assert!(gate.is_running());
        assert!(matches!(gate.acquire("second"), GateDecision::Skip(SkipReason::Busy)));
        drop(permit);
        assert!(!gate.is_running());
        // "second" was never recorded, so it proceeds now.
        assert!(matches!(gate.acquire("second"), GateDecision::Proceed(_)));
    }

    #[test]
    fn in_flight_duplicate_is_busy_not_duplicate() {
        let gate = RequestGate::new(Duration::from_secs(4));
        let _permit = match gate.acquire("same") {
            GateDecision::Proceed(p) => p,
            other => panic!("expected proceed, got {:?}", other),
        };
        // Signature only counts once the first call has completed.
        assert!(matches!(gate.acquire("same"), GateDecision::Skip(SkipReason::Busy)));
    }

    #[test]
    fn window_expiry_allows_repeat() {
        let gate = RequestGate::new(Duration::from_millis(30));
        if let GateDecision::Proceed(p) = gate.acquire("repeat me") {
            drop(p);
        }
        std::thread::sleep(Duration::from_millis(60));
        assert!(matches!(gate.acquire("repeat me"), GateDecision::Proceed(_)));
    }

    #[test]
    fn permit_released_on_panic() {
        let gate = RequestGate::new(Duration::from_secs(4));
        let cloned = gate.clone();
        let handle = std::thread::spawn(move || {
            let _permit = match cloned.acquire("explode") {
                GateDecision::Proceed(p) => p,
                _ => return,
            };
            panic!("downstream failure");
        });
        assert!(handle.join().is_err());
        assert!(!gate.is_running());
        assert!(matches!(gate.acquire("explode"), GateDecision::Skip(SkipReason::Duplicate)));
    }
}
