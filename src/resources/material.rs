use cgmath::{Vector3, Vector4};

use crate::data_structures::material::{AlphaMode, Material, TextureRef, Workflow};

fn texture_ref(info: Option<gltf::texture::Info<'_>>) -> Option<TextureRef> {
    info.map(|info| TextureRef {
        texture: info.texture().index(),
        tex_coord: info.tex_coord(),
    })
}

fn alpha_mode(mode: gltf::material::AlphaMode) -> AlphaMode {
    match mode {
        gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
        gltf::material::AlphaMode::Mask => AlphaMode::Mask,
        gltf::material::AlphaMode::Blend => AlphaMode::Blend,
    }
}

/// Picks the shading workflow. A material carrying the specular-glossiness
/// extension is shaded with it, everything else is metallic-roughness.
fn workflow(material: &gltf::Material<'_>) -> Workflow {
    if let Some(sg) = material.pbr_specular_glossiness() {
        return Workflow::SpecularGlossiness {
            diffuse_factor: Vector4::from(sg.diffuse_factor()),
            specular_factor: Vector3::from(sg.specular_factor()),
            glossiness_factor: sg.glossiness_factor(),
            diffuse_texture: texture_ref(sg.diffuse_texture()),
            specular_glossiness_texture: texture_ref(sg.specular_glossiness_texture()),
        };
    }
    let pbr = material.pbr_metallic_roughness();
    Workflow::MetallicRoughness {
        base_color_factor: Vector4::from(pbr.base_color_factor()),
        metallic_factor: pbr.metallic_factor(),
        roughness_factor: pbr.roughness_factor(),
        base_color_texture: texture_ref(pbr.base_color_texture()),
        metallic_roughness_texture: texture_ref(pbr.metallic_roughness_texture()),
    }
}

pub fn load_material(material: &gltf::Material<'_>, index: u32) -> Material {
    Material {
        name: material.name().map(str::to_string),
        workflow: workflow(material),
        alpha_mode: alpha_mode(material.alpha_mode()),
        alpha_cutoff: material.alpha_cutoff().unwrap_or(0.5),
        emissive_factor: Vector3::from(material.emissive_factor()).extend(1.0),
        emissive_strength: material.emissive_strength().unwrap_or(1.0),
        normal_texture: material.normal_texture().map(|t| TextureRef {
            texture: t.texture().index(),
            tex_coord: t.tex_coord(),
        }),
        occlusion_texture: material.occlusion_texture().map(|t| TextureRef {
            texture: t.texture().index(),
            tex_coord: t.tex_coord(),
        }),
        emissive_texture: texture_ref(material.emissive_texture()),
        double_sided: material.double_sided(),
        index,
    }
}

/// Loads every document material and appends the default material that
/// primitives without a material reference.
pub fn load_materials(document: &gltf::Document) -> Vec<Material> {
    let mut materials: Vec<Material> = document
        .materials()
        .enumerate()
        .map(|(index, material)| load_material(&material, index as u32))
        .collect();
    materials.push(Material {
        name: Some("default".to_string()),
        index: materials.len() as u32,
        ..Default::default()
    });
    materials
}
