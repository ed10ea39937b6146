use std::path::Path;

use anyhow::{Context, Result};
use hemibake::bake::Bake;
use hemibake::output;
use hemibake::scene::Scene;
use hemibake::settings;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = settings::load_config()?;
    let scene = Scene::load(Path::new(&settings.scene), &settings.assets_path())
        .with_context(|| format!("failed to load scene {}", settings.scene))?;

    let mut bake = Bake::new(scene, settings)?;
    let mut renderer = bake.raycast_renderer()?;

    bake.run(&mut renderer)?;
    output::writeup(&bake)?;

    Ok(())
}
