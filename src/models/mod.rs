pub mod run;
pub mod storyboard;

pub use run::{Activity, Run, RunSnapshot, Stage};
pub use storyboard::{
    validate_scene_index, Scene, SceneField, SceneRole, SceneStatus, Storyboard, Style, SCENE_COUNT,
};
