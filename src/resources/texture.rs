use std::path::Path;

use crate::{
    data_structures::texture::{Texture, TextureSampler, sampler_from_gltf},
    device::GpuDevice,
    resources::ImportError,
};

/// Resolves every document sampler, in document order.
pub fn load_samplers(document: &gltf::Document) -> Vec<TextureSampler> {
    document
        .samplers()
        .map(|sampler| sampler_from_gltf(&sampler))
        .collect()
}

/// Decodes and uploads every document texture, one blocking submission each.
///
/// The returned list is indexed like the document's texture array, which is
/// what material texture slots refer to.
pub fn load_textures<D: GpuDevice>(
    device: &D,
    document: &gltf::Document,
    base: Option<&Path>,
    buffers: &[gltf::buffer::Data],
    samplers: &[TextureSampler],
) -> Result<Vec<Texture<D>>, ImportError> {
    if document.textures().count() == 0 {
        return Ok(Vec::new());
    }
    let images = gltf::import_images(document, base, buffers).map_err(ImportError::ImageDecode)?;

    let mut textures = Vec::with_capacity(images.len());
    for texture in document.textures() {
        let source = texture.source();
        let Some(data) = images.get(source.index()) else {
            return Err(ImportError::MissingImage {
                texture: texture.index(),
                image: source.index(),
            });
        };
        let sampler = match texture.sampler().index() {
            Some(index) => samplers.get(index).copied().unwrap_or_default(),
            None => TextureSampler::default(),
        };
        let name = texture
            .name()
            .or_else(|| source.name())
            .map(str::to_string);
        log::debug!(
            "texture {} {:?}: {}x{} {:?}",
            texture.index(),
            name,
            data.width,
            data.height,
            data.format
        );
        textures.push(Texture::from_gltf_image(device, data, name, sampler)?);
    }
    Ok(textures)
}
