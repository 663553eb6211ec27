// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Frame pacing between the CPU and the GPU.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A single-permit semaphore bounding the number of frames in flight to one.
///
/// `frame_begin` takes the permit and it comes back when the GPU has
/// finished the frame. The direct-state backend returns it at `frame_end`.
/// The command-buffer backend returns it from the queue's completion
/// callback, possibly on another thread.
#[derive(Debug)]
pub struct FrameThrottle {
    available: Mutex<bool>,
    signal: Condvar,
}

impl Default for FrameThrottle {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameThrottle {
    /// A throttle whose permit is available.
    pub fn new() -> Self {
        Self {
            available: Mutex::new(true),
            signal: Condvar::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, bool> {
        // A poisoned flag is still a valid flag.
        self.available
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until the permit is available, then takes it.
    pub fn acquire(&self) {
        let mut available = self.state();
        while !*available {
            available = self
                .signal
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *available = false;
    }

    /// Takes the permit if it is available right now.
    pub fn try_acquire(&self) -> bool {
        let mut available = self.state();
        std::mem::replace(&mut *available, false)
    }

    /// Waits at most `timeout` for the permit. Returns `true` when it was taken.
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let guard = self.state();
        let (mut available, _) = self
            .signal
            .wait_timeout_while(guard, timeout, |available| !*available)
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *available, false)
    }

    /// Returns the permit. Releasing an available permit changes nothing.
    pub fn release(&self) {
        let mut available = self.state();
        if *available {
            log::warn!("FrameThrottle released while no frame was outstanding");
            return;
        }
        *available = true;
        self.signal.notify_one();
    }

    /// Number of frames holding the permit, `0` or `1`.
    pub fn outstanding(&self) -> usize {
        usize::from(!*self.state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_single_permit() {
        let throttle = FrameThrottle::new();
        assert_eq!(throttle.outstanding(), 0);
        throttle.acquire();
        assert_eq!(throttle.outstanding(), 1);
        assert!(!throttle.try_acquire());
        assert!(!throttle.acquire_timeout(Duration::from_millis(20)));
        throttle.release();
        assert!(throttle.try_acquire());
        throttle.release();
        throttle.release();
        assert_eq!(throttle.outstanding(), 0);
    }

    #[test]
    fn test_release_from_other_thread_wakes_waiter() {
        let throttle = Arc::new(FrameThrottle::new());
        throttle.acquire();
        let remote = Arc::clone(&throttle);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.release();
        });
        assert!(throttle.acquire_timeout(Duration::from_secs(5)));
        assert_eq!(throttle.outstanding(), 1);
        handle.join().unwrap();
    }
}
