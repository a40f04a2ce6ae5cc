// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the drop-oldest frame queue

use camfx::Frame;
use camfx::backends::virtual_camera::FrameQueue;
use std::sync::Arc;
use std::time::Duration;

fn tagged(tag: u8) -> Frame {
    Frame::from_rgb(1, 1, vec![tag, tag, tag]).unwrap()
}

#[test]
fn test_newest_frames_survive_overflow() {
    let queue = FrameQueue::with_capacity(2);
    queue.push(tagged(1));
    queue.push(tagged(2));
    queue.push(tagged(3));

    assert_eq!(queue.len(), 2);
    assert_eq!(queue.pop(), Some(tagged(3)));
    assert_eq!(queue.pop(), Some(tagged(2)));
    assert_eq!(queue.pop(), None);
}

#[test]
fn test_pop_timeout_on_empty_queue() {
    let queue = FrameQueue::new();
    assert_eq!(queue.pop_timeout(Duration::from_millis(5)), None);
}

#[test]
fn test_pop_timeout_wakes_on_push() {
    let queue = Arc::new(FrameQueue::new());
    let producer = Arc::clone(&queue);
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(10));
        producer.push(tagged(7));
    });

    let frame = queue.pop_timeout(Duration::from_secs(2));
    handle.join().unwrap();
    assert_eq!(frame, Some(tagged(7)));
}
