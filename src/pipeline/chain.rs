// src/pipeline/chain.rs
//! Positional reference chain between keyframes.

use chrono::Utc;

use crate::models::{Storyboard, SCENE_COUNT};

/// `REFERENCE_SOURCES[i]` is the scene whose image steers scene `i`.
pub const REFERENCE_SOURCES: [Option<usize>; SCENE_COUNT] = [None, Some(0), Some(1)];

/// Scenes without a reference source anchor the whole run: their image becomes the seed image.
pub fn anchors_run(index: usize) -> bool {
    matches!(REFERENCE_SOURCES.get(index), Some(None))
}

/// Reference URL for `index`, read from live state: the source scene's current
/// image, else the run's seed image. Anchor scenes never get one.
pub fn resolve_reference(
    storyboard: &Storyboard,
    seed_image_url: Option<&str>,
    index: usize,
) -> Option<String> {
    let source = (*REFERENCE_SOURCES.get(index)?)?;
    storyboard.scenes[source]
        .image_url()
        .or(seed_image_url)
        .map(str::to_string)
}

pub fn mint_seed() -> String {
    format!("brand-consistency-{}", Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SceneStatus;

    fn board_with(images: [Option<&str>; SCENE_COUNT]) -> Storyboard {
        let mut board = Storyboard::skeleton();
        for (scene, image) in board.scenes.iter_mut().zip(images) {
            if let Some(url) = image {
                scene.status = SceneStatus::Ready { image_url: url.to_string() };
            }
        }
        board
    }

    #[test]
    fn test_chain_is_linear() {
        assert_eq!(REFERENCE_SOURCES, [None, Some(0), Some(1)]);
        assert!(anchors_run(0));
        assert!(!anchors_run(1));
        assert!(!anchors_run(3));
    }

    #[test]
    fn test_scene_zero_never_has_a_reference() {
        let board = board_with([Some("u0"), Some("u1"), Some("u2")]);
        assert_eq!(resolve_reference(&board, Some("seed"), 0), None);
    }

    #[test]
    fn test_uses_previous_scene_image() {
        let board = board_with([Some("u0"), Some("u1"), None]);
        assert_eq!(resolve_reference(&board, Some("seed"), 1).as_deref(), Some("u0"));
        assert_eq!(resolve_reference(&board, Some("seed"), 2).as_deref(), Some("u1"));
    }

    #[test]
    fn test_falls_back_to_seed_image() {
        let board = board_with([None, None, None]);
        assert_eq!(resolve_reference(&board, Some("seed"), 2).as_deref(), Some("seed"));
        assert_eq!(resolve_reference(&board, None, 1), None);
    }

    #[test]
    fn test_seed_format() {
        let seed = mint_seed();
        let millis = seed.strip_prefix("brand-consistency-").unwrap();
        assert!(millis.parse::<i64>().is_ok());
    }
}
