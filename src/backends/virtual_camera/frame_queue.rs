// SPDX-License-Identifier: GPL-3.0-only

//! Bounded drop-oldest frame queue
//!
//! Hands frames from a pipeline streaming thread to a synchronous reader.
//! When full, pushing evicts the oldest frame. Popping returns the most
//! recent frame, so readers always see the freshest data.

use crate::backends::camera::types::Frame;
use crate::constants::queue::CAPACITY;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug)]
pub struct FrameQueue {
    frames: Mutex<VecDeque<Frame>>,
    available: Condvar,
    capacity: usize,
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::with_capacity(CAPACITY)
    }
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Append a frame, evicting the oldest if full
    pub fn push(&self, frame: Frame) {
        let mut frames = self.frames.lock();
        if frames.len() == self.capacity {
            frames.pop_front();
        }
        frames.push_back(frame);
        drop(frames);
        self.available.notify_one();
    }

    /// Remove and return the most recent frame, if any
    pub fn pop(&self) -> Option<Frame> {
        self.frames.lock().pop_back()
    }

    /// Like [`pop`](Self::pop), waiting up to `timeout` for a frame to arrive
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Frame> {
        let mut frames = self.frames.lock();
        if frames.is_empty() {
            // Spurious wakeups just end the wait early
            let _ = self.available.wait_for(&mut frames, timeout);
        }
        frames.pop_back()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    pub fn clear(&self) {
        self.frames.lock().clear();
    }
}
