pub mod config;
pub mod events;
pub mod processing {
    pub mod blur_levels;
    pub mod tiling;
    pub mod weights;
}
pub mod render {
    pub mod animator;
    pub mod blend;
    pub mod compositor;
    pub mod pipelines;
    pub mod projection;
    pub mod texture_store;
    pub mod viewer;
}
pub mod tasks {
    pub mod generator;
}
