//! Materials and their packed shader-side record.
//!
//! A material is shaded under exactly one workflow, chosen at import time:
//! core glTF metallic-roughness or the `KHR_materials_pbrSpecularGlossiness`
//! extension. [`Workflow`] carries the factors and texture slots that only
//! make sense for one of them.

use bytemuck::{Pod, Zeroable};
use cgmath::{Vector3, Vector4};

/// Discriminant written into [`MaterialRecord::workflow`].
pub const WORKFLOW_METALLIC_ROUGHNESS: f32 = 0.0;
pub const WORKFLOW_SPECULAR_GLOSSINESS: f32 = 1.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AlphaMode {
    #[default]
    Opaque,
    Mask,
    Blend,
}

/// A texture slot: index into the scene's texture list plus the UV set it samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureRef {
    pub texture: usize,
    pub tex_coord: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Workflow {
    MetallicRoughness {
        base_color_factor: Vector4<f32>,
        metallic_factor: f32,
        roughness_factor: f32,
        base_color_texture: Option<TextureRef>,
        metallic_roughness_texture: Option<TextureRef>,
    },
    SpecularGlossiness {
        diffuse_factor: Vector4<f32>,
        specular_factor: Vector3<f32>,
        glossiness_factor: f32,
        diffuse_texture: Option<TextureRef>,
        specular_glossiness_texture: Option<TextureRef>,
    },
}

impl Default for Workflow {
    fn default() -> Self {
        Workflow::MetallicRoughness {
            base_color_factor: Vector4::new(1.0, 1.0, 1.0, 1.0),
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            base_color_texture: None,
            metallic_roughness_texture: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: Option<String>,
    pub workflow: Workflow,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub emissive_factor: Vector4<f32>,
    pub emissive_strength: f32,
    pub normal_texture: Option<TextureRef>,
    pub occlusion_texture: Option<TextureRef>,
    pub emissive_texture: Option<TextureRef>,
    pub double_sided: bool,
    /// Position in the scene's material list, used as the GPU lookup key.
    pub index: u32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: None,
            workflow: Workflow::default(),
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 1.0,
            emissive_factor: Vector4::new(0.0, 0.0, 0.0, 0.0),
            emissive_strength: 1.0,
            normal_texture: None,
            occlusion_texture: None,
            emissive_texture: None,
            double_sided: false,
            index: 0,
        }
    }
}

impl Material {
    /// Packs this material into the layout read by the shading pass.
    pub fn to_record(&self) -> MaterialRecord {
        let slot = |t: Option<TextureRef>| t.map_or(-1, |t| t.texture as i32);
        let uv_set = |t: Option<TextureRef>| t.map_or(-1, |t| t.tex_coord as i32);
        let mut record = MaterialRecord {
            base_color_factor: [1.0; 4],
            emissive_factor: self.emissive_factor.into(),
            diffuse_factor: [1.0; 4],
            specular_factor: [0.0, 0.0, 0.0, 1.0],
            workflow: WORKFLOW_METALLIC_ROUGHNESS,
            base_color_index: -1,
            metallic_roughness_index: -1,
            normal_index: slot(self.normal_texture),
            occlusion_index: slot(self.occlusion_texture),
            emissive_index: slot(self.emissive_texture),
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            alpha_mask: if self.alpha_mode == AlphaMode::Mask { 1.0 } else { 0.0 },
            alpha_mask_cutoff: self.alpha_cutoff,
            emissive_strength: self.emissive_strength,
            base_color_uv_set: -1,
            metallic_roughness_uv_set: -1,
            normal_uv_set: uv_set(self.normal_texture),
            occlusion_uv_set: uv_set(self.occlusion_texture),
            emissive_uv_set: uv_set(self.emissive_texture),
        };
        match &self.workflow {
            Workflow::MetallicRoughness {
                base_color_factor,
                metallic_factor,
                roughness_factor,
                base_color_texture,
                metallic_roughness_texture,
            } => {
                record.base_color_factor = (*base_color_factor).into();
                record.metallic_factor = *metallic_factor;
                record.roughness_factor = *roughness_factor;
                record.base_color_index = slot(*base_color_texture);
                record.base_color_uv_set = uv_set(*base_color_texture);
                record.metallic_roughness_index = slot(*metallic_roughness_texture);
                record.metallic_roughness_uv_set = uv_set(*metallic_roughness_texture);
            }
            Workflow::SpecularGlossiness {
                diffuse_factor,
                specular_factor,
                diffuse_texture,
                specular_glossiness_texture,
                ..
            } => {
                record.workflow = WORKFLOW_SPECULAR_GLOSSINESS;
                record.diffuse_factor = (*diffuse_factor).into();
                record.specular_factor = specular_factor.extend(1.0).into();
                record.base_color_index = slot(*diffuse_texture);
                record.base_color_uv_set = uv_set(*diffuse_texture);
                record.metallic_roughness_index = slot(*specular_glossiness_texture);
                record.metallic_roughness_uv_set = uv_set(*specular_glossiness_texture);
            }
        }
        record
    }
}

/// Per-material block as laid out in the material storage buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialRecord {
    pub base_color_factor: [f32; 4],
    pub emissive_factor: [f32; 4],
    pub diffuse_factor: [f32; 4],
    pub specular_factor: [f32; 4],
    pub workflow: f32,
    pub base_color_index: i32,
    pub metallic_roughness_index: i32,
    pub normal_index: i32,
    pub occlusion_index: i32,
    pub emissive_index: i32,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub alpha_mask: f32,
    pub alpha_mask_cutoff: f32,
    pub emissive_strength: f32,
    /// UV set sampled by each texture slot, -1 when the slot is empty.
    pub base_color_uv_set: i32,
    pub metallic_roughness_uv_set: i32,
    pub normal_uv_set: i32,
    pub occlusion_uv_set: i32,
    pub emissive_uv_set: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<MaterialRecord>(), 128);
    }

    #[test]
    fn default_material_has_no_textures() {
        let record = Material::default().to_record();
        assert_eq!(record.workflow, WORKFLOW_METALLIC_ROUGHNESS);
        assert_eq!(record.base_color_index, -1);
        assert_eq!(record.metallic_roughness_index, -1);
        assert_eq!(record.normal_index, -1);
        assert_eq!(record.occlusion_index, -1);
        assert_eq!(record.emissive_index, -1);
        assert_eq!(record.base_color_uv_set, -1);
        assert_eq!(record.normal_uv_set, -1);
        assert_eq!(record.alpha_mask, 0.0);
    }

    #[test]
    fn specular_glossiness_uses_its_own_slots() {
        let material = Material {
            workflow: Workflow::SpecularGlossiness {
                diffuse_factor: Vector4::new(0.5, 0.25, 1.0, 1.0),
                specular_factor: Vector3::new(0.1, 0.2, 0.3),
                glossiness_factor: 0.8,
                diffuse_texture: Some(TextureRef { texture: 3, tex_coord: 0 }),
                specular_glossiness_texture: Some(TextureRef { texture: 4, tex_coord: 1 }),
            },
            alpha_mode: AlphaMode::Mask,
            alpha_cutoff: 0.5,
            ..Default::default()
        };
        let record = material.to_record();
        assert_eq!(record.workflow, WORKFLOW_SPECULAR_GLOSSINESS);
        assert_eq!(record.diffuse_factor, [0.5, 0.25, 1.0, 1.0]);
        assert_eq!(record.specular_factor, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(record.base_color_index, 3);
        assert_eq!(record.metallic_roughness_index, 4);
        assert_eq!(record.base_color_uv_set, 0);
        assert_eq!(record.metallic_roughness_uv_set, 1);
        assert_eq!(record.alpha_mask, 1.0);
        assert_eq!(record.alpha_mask_cutoff, 0.5);
    }
}
