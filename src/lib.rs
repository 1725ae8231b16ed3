pub mod aabb;
pub mod buffers;
pub mod builder;
pub mod bvh;
pub mod bvh_node;
pub mod links;
pub mod primitive;

pub use aabb::*;
pub use buffers::*;
pub use builder::*;
pub use bvh::*;
pub use bvh_node::*;
pub use links::*;
pub use primitive::*;
