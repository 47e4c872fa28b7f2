//! GPU compute pipelines.
//!
//! - `ibl`: equirectangular HDR to environment, irradiance and specular
//!   cubemaps plus the BRDF integration LUT

pub mod ibl;
