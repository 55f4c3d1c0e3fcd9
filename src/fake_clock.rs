use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::{Clock, Wake};

/// Clock that only moves when told to. Clones share the same time.
#[derive(Clone)]
pub struct FakeClock {
    cur: Arc<Mutex<Instant>>,
    wakers: Arc<Mutex<Vec<Wake>>>,
}

impl Default for FakeClock {
    fn default() -> Self {
        FakeClock {
            cur: Arc::new(Mutex::new(Instant::now())),
            wakers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.cur.lock()
    }

    fn on_advance(&self, wake: Wake) {
        self.wakers.lock().push(wake);
    }
}

impl FakeClock {
    pub fn advance(&self, duration: Duration) {
        *self.cur.lock() += duration;
        self.wakers.lock().retain(|wake| wake());
    }
}
