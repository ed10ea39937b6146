/// Tolerance for two vertices to be considered the same point.
pub const VERTEX_EPSILON: f32 = 1e-6;
/// Minimum cross product magnitude for a triangle to be non-degenerate.
pub const DEGENERATE_EPSILON: f32 = 1e-10;
/// Minimum ray distance for a hit to count. Hits closer than this are ignored.
pub const RAYCAST_MINIMUM_DISTANCE: f32 = 1e-4;
/// Offset along the normal applied to ray origins leaving a surface.
pub const SURFACE_OFFSET: f32 = 1e-3;
/// Maximum triangles stored in a BVH leaf.
pub const BVH_LEAF_SIZE: usize = 4;
/// Dot product above which a direction counts as parallel to the global up axis.
pub const CAMERA_UP_PARALLEL: f32 = 0.9999;
/// Distance below which a point-segment distance is treated as degenerate.
pub const DEGENERATE_DISTANCE: f32 = 1e-6;
/// Gamma applied to the tone-mapped preview.
pub const PREVIEW_GAMMA: f32 = 2.2;
/// Texture name used when a referenced texture cannot be found.
pub const DEFAULT_TEXTURE: &str = "default";
/// Size in bytes of the texture name field in compiled triangles.
pub const TEXTURE_NAME_LEN: usize = 256;
/// Near clip distance of the hemicube cameras.
pub const NEAR_PLANE: f32 = 0.1;
/// Far clip distance of the hemicube cameras.
pub const FAR_PLANE: f32 = 4000.0;
/// Patches whose hemicube views are submitted to the renderer in one batch.
pub const RENDER_BATCH_PATCHES: usize = 64;
