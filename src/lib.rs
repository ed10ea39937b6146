pub mod atlas;
pub mod bake;
pub mod bvh;
pub mod compiled;
pub mod config;
pub mod error;
pub mod frame;
pub mod geom;
pub mod hemicube;
pub mod legality;
pub mod light;
pub mod lightmap;
pub mod lightmapper;
pub mod output;
pub mod progress;
pub mod raycast;
pub mod renderer;
pub mod scene;
pub mod settings;
pub mod texel_tree;
