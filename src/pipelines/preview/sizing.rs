// SPDX-License-Identifier: GPL-3.0-only

//! Preview resolution selection

use crate::backends::camera::Size;
use crate::constants::preview::SIZE_DIFFERENCE_WEIGHT;

/// Pick the supported size closest to a `width`×`height` surface
///
/// Score is the aspect ratio difference plus a small penalty on the width
/// difference; the first candidate with the lowest score wins. Returns `None`
/// only for an empty candidate list. A zero-height target has no aspect
/// ratio, so the first candidate is returned.
pub fn choose_optimal_size(candidates: &[Size], width: u32, height: u32) -> Option<Size> {
    let first = *candidates.first()?;
    if height == 0 {
        return Some(first);
    }

    let target_ratio = width as f32 / height as f32;
    let score = |size: &Size| {
        let ratio = if size.height == 0 {
            f32::INFINITY
        } else {
            size.aspect_ratio()
        };
        (ratio - target_ratio).abs()
            + SIZE_DIFFERENCE_WEIGHT * (size.width as f32 - width as f32).abs()
    };

    let mut best = first;
    let mut best_score = score(&first);
    for candidate in &candidates[1..] {
        let candidate_score = score(candidate);
        if candidate_score < best_score {
            best = *candidate;
            best_score = candidate_score;
        }
    }
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(list: &[(u32, u32)]) -> Vec<Size> {
        list.iter().map(|&s| Size::from(s)).collect()
    }

    #[test]
    fn test_exact_match_wins() {
        let candidates = sizes(&[(1920, 1080), (1280, 720), (640, 480)]);
        assert_eq!(
            choose_optimal_size(&candidates, 1280, 720),
            Some(Size::new(1280, 720))
        );
    }

    #[test]
    fn test_width_dominates_for_distant_sizes() {
        // 0.1 per pixel of width quickly outweighs any aspect difference
        let candidates = sizes(&[(1920, 1080), (640, 480)]);
        assert_eq!(
            choose_optimal_size(&candidates, 720, 1280),
            Some(Size::new(640, 480))
        );
    }

    #[test]
    fn test_ties_keep_input_order() {
        let candidates = sizes(&[(800, 600), (800, 600), (640, 480)]);
        let chosen = choose_optimal_size(&candidates, 800, 600).unwrap();
        assert_eq!(chosen, candidates[0]);
    }

    #[test]
    fn test_empty_and_degenerate_targets() {
        assert_eq!(choose_optimal_size(&[], 640, 480), None);
        let candidates = sizes(&[(320, 240), (640, 480)]);
        assert_eq!(
            choose_optimal_size(&candidates, 640, 0),
            Some(Size::new(320, 240))
        );
    }

    #[test]
    fn test_result_is_always_a_candidate() {
        let candidates = sizes(&[
            (4032, 3024),
            (1920, 1080),
            (1440, 1080),
            (1280, 960),
            (720, 480),
            (352, 288),
            (176, 144),
        ]);
        for width in (1..4000).step_by(97) {
            for height in (1..3000).step_by(89) {
                let chosen = choose_optimal_size(&candidates, width, height).unwrap();
                assert!(candidates.contains(&chosen), "{} not a candidate", chosen);
            }
        }
    }
}
