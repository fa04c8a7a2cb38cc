#![doc = env!("CARGO_PKG_DESCRIPTION")]

#[doc(inline)]
pub use handgeo_3d as k3d;

#[doc(inline)]
pub use handgeo_loss as loss;

#[doc(inline)]
pub use handgeo_train as train;
