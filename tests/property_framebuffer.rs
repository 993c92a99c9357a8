//! Frame buffer pixel access and dirty-region diffing.
//!
//! A diff of a frame against itself is empty; the diff of two frames covers
//! every changed pixel with in-bounds, sorted, non-overlapping rectangles.

use eink_clock::{Channel, ClockError, FrameBuffer, Rect, Resolution};
use proptest::prelude::*;

fn arb_channel() -> impl Strategy<Value = Channel> {
    prop_oneof![Just(Channel::Primary), Just(Channel::Accent)]
}

/// A frame of random size with a random scatter of inked pixels.
fn arb_frame_pair() -> impl Strategy<Value = (FrameBuffer, FrameBuffer)> {
    (1u32..=70, 1u32..=40).prop_flat_map(|(w, h)| {
        (arb_pixels(w, h), arb_pixels(w, h))
            .prop_map(move |(a, b)| (frame(w, h, &a), frame(w, h, &b)))
    })
}

fn arb_pixels(w: u32, h: u32) -> impl Strategy<Value = Vec<(u32, u32, Channel)>> {
    proptest::collection::vec((0..w, 0..h, arb_channel()), 0..60)
}

fn frame(w: u32, h: u32, pixels: &[(u32, u32, Channel)]) -> FrameBuffer {
    let mut frame = FrameBuffer::new(Resolution::new(w, h).unwrap());
    for &(x, y, channel) in pixels {
        frame.set_pixel(x, y, channel, true).unwrap();
    }
    frame
}

fn differs(a: &FrameBuffer, b: &FrameBuffer, x: u32, y: u32) -> bool {
    [Channel::Primary, Channel::Accent]
        .into_iter()
        .any(|c| a.pixel(x, y, c).unwrap() != b.pixel(x, y, c).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A frame never differs from itself.
    #[test]
    fn diff_with_self_is_empty((frame, _) in arb_frame_pair()) {
        prop_assert!(frame.diff(&frame).unwrap().is_empty());
        prop_assert!(frame.diff(&frame.clone()).unwrap().is_empty());
    }

    /// Every changed pixel lies in exactly one reported region, and regions
    /// stay inside the panel in top-to-bottom order.
    #[test]
    fn diff_covers_every_change((current, previous) in arb_frame_pair()) {
        let regions = current.diff(&previous).unwrap();
        let bounds = current.resolution().bounds();

        for region in &regions {
            prop_assert!(!region.is_empty());
            prop_assert!(bounds.contains_rect(region), "{} outside {}", region, bounds);
        }
        for pair in regions.windows(2) {
            prop_assert!(pair[0] < pair[1], "{} before {}", pair[0], pair[1]);
        }
        for (i, a) in regions.iter().enumerate() {
            for b in &regions[i + 1..] {
                prop_assert!(!a.intersects(b), "{} overlaps {}", a, b);
            }
        }

        let res = current.resolution();
        for y in 0..res.height() {
            for x in 0..res.width() {
                if differs(&current, &previous, x, y) {
                    let hits = regions
                        .iter()
                        .filter(|r| r.contains_rect(&Rect::new(x, y, 1, 1)))
                        .count();
                    prop_assert_eq!(hits, 1, "pixel ({}, {})", x, y);
                }
            }
        }
    }

    /// Whatever is written inside the panel reads back unchanged.
    #[test]
    fn set_pixel_then_pixel_reads_back(
        (w, h, x, y) in (1u32..=300, 1u32..=200)
            .prop_flat_map(|(w, h)| (Just(w), Just(h), 0..w, 0..h)),
        channel in arb_channel(),
        value in any::<bool>(),
    ) {
        let mut frame = FrameBuffer::new(Resolution::new(w, h).unwrap());
        frame.set_pixel(x, y, channel, value).unwrap();
        prop_assert_eq!(frame.pixel(x, y, channel).unwrap(), value);
    }

    /// Writes outside the panel fail and change nothing.
    #[test]
    fn set_pixel_outside_fails(
        w in 1u32..=300,
        h in 1u32..=200,
        dx in 0u32..50,
        dy in 0u32..50,
        past_right in any::<bool>(),
        channel in arb_channel(),
    ) {
        let mut frame = FrameBuffer::new(Resolution::new(w, h).unwrap());
        let (x, y) = if past_right { (w + dx, dy % h) } else { (dx % w, h + dy) };
        let result = frame.set_pixel(x, y, channel, true);
        let is_out_of_bounds = matches!(result, Err(ClockError::OutOfBounds { .. }));
        prop_assert!(is_out_of_bounds);
        prop_assert!(frame.is_blank());
    }
}
