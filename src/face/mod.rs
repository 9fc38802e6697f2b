pub mod channel;
pub mod normalize;

pub use channel::{FaceChannel, NamedChannel};
pub use normalize::{BlendshapeCategory, FaceNormalizer, HeadRotation};
