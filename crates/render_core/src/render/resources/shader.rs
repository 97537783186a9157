//! SPIR-V loading, reflection and program linking
//!
//! Every module is reflected when it is loaded: descriptor bindings and push
//! constant blocks for all stages, plus the vertex input layout for vertex
//! shaders. Modules are cached per stage by file name, so programs sharing a
//! stage file share the module.
//!
//! A program merges the binding and push-constant metadata of its two stages
//! into the form the pipeline layout needs.

use std::collections::HashMap;
use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use spirv_reflect::types::descriptor::ReflectDescriptorType;
use spirv_reflect::types::variable::ReflectDecorationFlags;
use spirv_reflect::types::ReflectFormat;
use thiserror::Error;

use crate::render::backends::GpuDevice;
use crate::render::error::VulkanError;
use crate::render::types::ShaderProgramType;
use crate::render::utils::{format_size, merge_descriptor_bindings, merge_push_constant_ranges};

/// Shader load and reflection errors
#[derive(Error, Debug)]
pub enum ShaderError {
    /// The file could not be read or is not word-aligned SPIR-V
    #[error("Failed to read shader {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// SPIR-V reflection rejected the module
    #[error("Failed to reflect shader {path}: {message}")]
    Reflection {
        /// File that failed
        path: PathBuf,
        /// Reflection library message
        message: String,
    },

    /// The driver rejected the module
    #[error(transparent)]
    Device(#[from] VulkanError),
}

/// A compiled stage and what reflection found in it
#[derive(Debug)]
pub struct ShaderModule {
    /// Module handle
    pub handle: vk::ShaderModule,
    /// Stage this module was loaded for
    pub stage: vk::ShaderStageFlags,
    /// Entry point name
    pub entry_point: CString,
    /// Descriptor bindings, stage flags set to `stage`
    pub descriptor_bindings: Vec<vk::DescriptorSetLayoutBinding>,
    /// Push-constant blocks
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
    /// Vertex attributes (vertex stage only)
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    /// Vertex buffer bindings (vertex stage only)
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
}

/// Vertex + fragment pair with merged layout metadata
#[derive(Debug)]
pub struct ShaderProgram {
    /// Vertex stage
    pub vertex: Arc<ShaderModule>,
    /// Fragment stage
    pub fragment: Arc<ShaderModule>,
    /// Union of both stages' bindings, ascending by binding number
    pub merged_descriptor_bindings: Vec<vk::DescriptorSetLayoutBinding>,
    /// Push-constant ranges, identical ranges merged
    pub merged_push_constant_ranges: Vec<vk::PushConstantRange>,
}

/// A vertex shader input as reported by reflection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexInput {
    /// `layout(location = N)`
    pub location: u32,
    /// Attribute format
    pub format: vk::Format,
    /// Built-in variables (`gl_VertexIndex`, ...) have no attribute
    pub built_in: bool,
}

/// Build tightly packed attributes for a single per-vertex binding
///
/// Inputs are ordered by location, built-ins are skipped and each attribute
/// starts where the previous one ended. The binding stride is the total size.
pub fn build_vertex_input(
    inputs: &[VertexInput],
) -> (Vec<vk::VertexInputAttributeDescription>, vk::VertexInputBindingDescription) {
    let mut inputs: Vec<&VertexInput> = inputs.iter().filter(|input| !input.built_in).collect();
    inputs.sort_by_key(|input| input.location);

    let mut offset = 0;
    let attributes = inputs
        .into_iter()
        .map(|input| {
            let attribute = vk::VertexInputAttributeDescription {
                location: input.location,
                binding: 0,
                format: input.format,
                offset,
            };
            offset += format_size(input.format);
            attribute
        })
        .collect();

    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: offset,
        input_rate: vk::VertexInputRate::VERTEX,
    };
    (attributes, binding)
}

fn convert_descriptor_type(ty: ReflectDescriptorType) -> vk::DescriptorType {
    match ty {
        ReflectDescriptorType::Sampler => vk::DescriptorType::SAMPLER,
        ReflectDescriptorType::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        ReflectDescriptorType::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
        ReflectDescriptorType::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        ReflectDescriptorType::UniformTexelBuffer => vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
        ReflectDescriptorType::StorageTexelBuffer => vk::DescriptorType::STORAGE_TEXEL_BUFFER,
        ReflectDescriptorType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        ReflectDescriptorType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        ReflectDescriptorType::UniformBufferDynamic => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        ReflectDescriptorType::StorageBufferDynamic => vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
        ReflectDescriptorType::InputAttachment => vk::DescriptorType::INPUT_ATTACHMENT,
        other => {
            log::warn!("Unsupported reflected descriptor type {:?}", other);
            vk::DescriptorType::SAMPLER
        }
    }
}

fn convert_format(format: ReflectFormat) -> vk::Format {
    match format {
        ReflectFormat::R32_UINT => vk::Format::R32_UINT,
        ReflectFormat::R32_SINT => vk::Format::R32_SINT,
        ReflectFormat::R32_SFLOAT => vk::Format::R32_SFLOAT,
        ReflectFormat::R32G32_UINT => vk::Format::R32G32_UINT,
        ReflectFormat::R32G32_SINT => vk::Format::R32G32_SINT,
        ReflectFormat::R32G32_SFLOAT => vk::Format::R32G32_SFLOAT,
        ReflectFormat::R32G32B32_UINT => vk::Format::R32G32B32_UINT,
        ReflectFormat::R32G32B32_SINT => vk::Format::R32G32B32_SINT,
        ReflectFormat::R32G32B32_SFLOAT => vk::Format::R32G32B32_SFLOAT,
        ReflectFormat::R32G32B32A32_UINT => vk::Format::R32G32B32A32_UINT,
        ReflectFormat::R32G32B32A32_SINT => vk::Format::R32G32B32A32_SINT,
        ReflectFormat::R32G32B32A32_SFLOAT => vk::Format::R32G32B32A32_SFLOAT,
        _ => vk::Format::UNDEFINED,
    }
}

/// Reflection output for one module
struct Reflected {
    entry_point: String,
    descriptor_bindings: Vec<vk::DescriptorSetLayoutBinding>,
    push_constant_ranges: Vec<vk::PushConstantRange>,
    vertex_inputs: Vec<VertexInput>,
}

fn reflect(path: &Path, bytes: &[u8], stage: vk::ShaderStageFlags) -> Result<Reflected, ShaderError> {
    let reflection_error = |message: &str| ShaderError::Reflection {
        path: path.to_path_buf(),
        message: message.to_string(),
    };

    let module = spirv_reflect::ShaderModule::load_u8_data(bytes).map_err(reflection_error)?;

    let descriptor_bindings = module
        .enumerate_descriptor_bindings(None)
        .map_err(reflection_error)?
        .into_iter()
        .map(|binding| vk::DescriptorSetLayoutBinding {
            binding: binding.binding,
            descriptor_type: convert_descriptor_type(binding.descriptor_type),
            descriptor_count: binding.count,
            stage_flags: stage,
            ..Default::default()
        })
        .collect();

    let push_constant_ranges = module
        .enumerate_push_constant_blocks(None)
        .map_err(reflection_error)?
        .into_iter()
        .map(|block| vk::PushConstantRange {
            stage_flags: stage,
            offset: block.offset,
            size: block.size,
        })
        .collect();

    let vertex_inputs = if stage == vk::ShaderStageFlags::VERTEX {
        module
            .enumerate_input_variables(None)
            .map_err(reflection_error)?
            .into_iter()
            .map(|input| VertexInput {
                location: input.location,
                format: convert_format(input.format),
                built_in: input.decoration_flags.contains(ReflectDecorationFlags::BUILT_IN),
            })
            .collect()
    } else {
        Vec::new()
    };

    Ok(Reflected {
        entry_point: module.get_entry_point_name(),
        descriptor_bindings,
        push_constant_ranges,
        vertex_inputs,
    })
}

/// Loads, caches and links shader modules
pub struct ShaderManager {
    device: Arc<dyn GpuDevice>,
    modules: HashMap<vk::ShaderStageFlags, HashMap<String, Arc<ShaderModule>>>,
    programs: HashMap<ShaderProgramType, Arc<ShaderProgram>>,
}

impl ShaderManager {
    /// Create a manager for `device`
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self {
            device,
            modules: HashMap::new(),
            programs: HashMap::new(),
        }
    }

    /// Load and reflect a SPIR-V file for `stage`, or return the cached module
    ///
    /// The cache key is the file name, so two paths ending in the same name
    /// resolve to the first module loaded.
    pub fn load_shader(&mut self, path: &Path, stage: vk::ShaderStageFlags) -> Result<Arc<ShaderModule>, ShaderError> {
        let name = path
            .file_name()
            .map_or_else(|| path.to_string_lossy(), |name| name.to_string_lossy())
            .into_owned();

        if let Some(module) = self.modules.get(&stage).and_then(|stage_map| stage_map.get(&name)) {
            return Ok(module.clone());
        }

        let io_error = |source| ShaderError::Io {
            path: path.to_path_buf(),
            source,
        };
        let bytes = std::fs::read(path).map_err(io_error)?;
        let code = ash::util::read_spv(&mut std::io::Cursor::new(&bytes)).map_err(io_error)?;
        let reflected = reflect(path, &bytes, stage)?;

        let entry_point = CString::new(reflected.entry_point).map_err(|e| ShaderError::Reflection {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let handle = self.device.create_shader_module(&code).map_err(|e| {
            log::error!("Shader Manager: driver rejected \"{}\": {e}", path.display());
            e
        })?;

        let (vertex_attributes, vertex_bindings) = if stage == vk::ShaderStageFlags::VERTEX {
            let (attributes, binding) = build_vertex_input(&reflected.vertex_inputs);
            (attributes, vec![binding])
        } else {
            (Vec::new(), Vec::new())
        };

        let module = Arc::new(ShaderModule {
            handle,
            stage,
            entry_point,
            descriptor_bindings: reflected.descriptor_bindings,
            push_constant_ranges: reflected.push_constant_ranges,
            vertex_attributes,
            vertex_bindings,
        });

        log::info!("Shader Manager: Loading Asset \"{}\"", path.display());
        self.modules.entry(stage).or_default().insert(name, module.clone());
        Ok(module)
    }

    /// Load both stages and link them into the program for `program_type`
    pub fn create_program(
        &mut self,
        program_type: ShaderProgramType,
        vertex_path: &Path,
        fragment_path: &Path,
    ) -> Result<Arc<ShaderProgram>, ShaderError> {
        let vertex = self.load_shader(vertex_path, vk::ShaderStageFlags::VERTEX)?;
        let fragment = self.load_shader(fragment_path, vk::ShaderStageFlags::FRAGMENT)?;

        let mut merged_descriptor_bindings = Vec::new();
        merge_descriptor_bindings(
            &mut merged_descriptor_bindings,
            &vertex.descriptor_bindings,
            vk::ShaderStageFlags::VERTEX,
        );
        merge_descriptor_bindings(
            &mut merged_descriptor_bindings,
            &fragment.descriptor_bindings,
            vk::ShaderStageFlags::FRAGMENT,
        );

        let mut merged_push_constant_ranges = Vec::new();
        merge_push_constant_ranges(
            &mut merged_push_constant_ranges,
            &vertex.push_constant_ranges,
            vk::ShaderStageFlags::VERTEX,
        );
        merge_push_constant_ranges(
            &mut merged_push_constant_ranges,
            &fragment.push_constant_ranges,
            vk::ShaderStageFlags::FRAGMENT,
        );

        let program = Arc::new(ShaderProgram {
            vertex,
            fragment,
            merged_descriptor_bindings,
            merged_push_constant_ranges,
        });
        self.programs.insert(program_type, program.clone());
        Ok(program)
    }

    /// Create every program from `<Stem>.vert.spv` / `<Stem>.frag.spv` in `shader_dir`
    pub fn load_programs(&mut self, shader_dir: &Path) -> Result<(), ShaderError> {
        for program_type in [
            ShaderProgramType::DefaultLit,
            ShaderProgramType::WorldSpaceText,
            ShaderProgramType::ScreenSpaceText,
            ShaderProgramType::PostProcessing,
        ] {
            let stem = program_type.file_stem();
            self.create_program(
                program_type,
                &shader_dir.join(format!("{stem}.vert.spv")),
                &shader_dir.join(format!("{stem}.frag.spv")),
            )?;
        }
        Ok(())
    }

    /// Program created for `program_type`
    pub fn program(&self, program_type: ShaderProgramType) -> Option<&Arc<ShaderProgram>> {
        self.programs.get(&program_type)
    }

    /// Number of distinct modules loaded across all stages
    pub fn module_count(&self) -> usize {
        self.modules.values().map(HashMap::len).sum()
    }
}

impl Drop for ShaderManager {
    fn drop(&mut self) {
        self.programs.clear();
        for module in self.modules.values().flat_map(HashMap::values) {
            self.device.destroy_shader_module(module.handle);
        }
        self.modules.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(location: u32, format: vk::Format) -> VertexInput {
        VertexInput {
            location,
            format,
            built_in: false,
        }
    }

    #[test]
    fn test_vertex_input_sorted_packed_and_skips_builtins() {
        let inputs = [
            input(2, vk::Format::R32G32_SFLOAT),
            VertexInput {
                location: u32::MAX,
                format: vk::Format::R32_SINT,
                built_in: true,
            },
            input(0, vk::Format::R32G32B32_SFLOAT),
            input(1, vk::Format::R32G32B32_SFLOAT),
        ];

        let (attributes, binding) = build_vertex_input(&inputs);

        let layout: Vec<(u32, u32)> = attributes.iter().map(|a| (a.location, a.offset)).collect();
        assert_eq!(layout, vec![(0, 0), (1, 12), (2, 24)]);
        assert!(attributes.iter().all(|a| a.binding == 0));
        assert_eq!(binding.stride, 32);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_vertex_input_without_attributes_has_zero_stride() {
        let (attributes, binding) = build_vertex_input(&[]);
        assert!(attributes.is_empty());
        assert_eq!(binding.stride, 0);
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let device = Arc::new(crate::render::backends::HeadlessDevice::new(8, 8));
        let mut shaders = ShaderManager::new(device);
        let result = shaders.load_shader(Path::new("missing/Nothing.vert.spv"), vk::ShaderStageFlags::VERTEX);
        assert!(matches!(result, Err(ShaderError::Io { .. })));
        assert_eq!(shaders.module_count(), 0);
    }

    #[test]
    fn test_descriptor_type_conversion() {
        assert_eq!(
            convert_descriptor_type(ReflectDescriptorType::StorageBuffer),
            vk::DescriptorType::STORAGE_BUFFER
        );
        assert_eq!(
            convert_descriptor_type(ReflectDescriptorType::InputAttachment),
            vk::DescriptorType::INPUT_ATTACHMENT
        );
        assert_eq!(convert_format(ReflectFormat::R32G32B32_SFLOAT), vk::Format::R32G32B32_SFLOAT);
    }
}
