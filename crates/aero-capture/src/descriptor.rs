//! Descriptor-heap slot contents.
//!
//! Descriptor heaps are captured as arrays of [`Descriptor`]s rather than raw bytes: the
//! resources a descriptor points at must be translated to capture ids and pulled into the
//! capture alongside the heap.

use crate::ids::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    Sampler,
    Cbv,
    Srv,
    Uav,
    Rtv,
    Dsv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ViewDimension {
    #[default]
    Unknown,
    Buffer,
    Texture1D,
    Texture1DArray,
    Texture2D,
    Texture2DArray,
    Texture2DMs,
    Texture3D,
    TextureCube,
    TextureCubeArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SamplerDesc {
    pub filter: u32,
    pub address_u: u32,
    pub address_v: u32,
    pub address_w: u32,
    pub mip_lod_bias: f32,
    pub max_anisotropy: u32,
    pub comparison_func: u32,
    pub border_color: [f32; 4],
    pub min_lod: f32,
    pub max_lod: f32,
}

/// Constant-buffer view: a GPU virtual address range inside `buffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CbvDesc {
    pub buffer_location: u64,
    pub size_in_bytes: u32,
}

/// Shared description for SRV/UAV/RTV/DSV views.
///
/// `first` is the first element for buffer views and the most detailed mip (or mip slice) for
/// texture views; `count` is the element, mip or array-slice count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewDesc {
    pub format: u32,
    pub dimension: ViewDimension,
    pub first: u64,
    pub count: u32,
    pub first_array_slice: u32,
    pub array_size: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Descriptor {
    /// Never-written slot.
    #[default]
    Null,
    Sampler(SamplerDesc),
    Cbv {
        buffer: Option<ResourceId>,
        desc: CbvDesc,
    },
    Srv {
        resource: Option<ResourceId>,
        desc: ViewDesc,
    },
    Uav {
        resource: Option<ResourceId>,
        counter: Option<ResourceId>,
        desc: ViewDesc,
    },
    Rtv {
        resource: Option<ResourceId>,
        desc: ViewDesc,
    },
    Dsv {
        resource: Option<ResourceId>,
        desc: ViewDesc,
    },
}

impl Descriptor {
    pub fn ty(&self) -> Option<DescriptorType> {
        match self {
            Descriptor::Null => None,
            Descriptor::Sampler(_) => Some(DescriptorType::Sampler),
            Descriptor::Cbv { .. } => Some(DescriptorType::Cbv),
            Descriptor::Srv { .. } => Some(DescriptorType::Srv),
            Descriptor::Uav { .. } => Some(DescriptorType::Uav),
            Descriptor::Rtv { .. } => Some(DescriptorType::Rtv),
            Descriptor::Dsv { .. } => Some(DescriptorType::Dsv),
        }
    }

    /// Resources this descriptor keeps alive on the GPU (viewed resource, UAV counter).
    pub fn resources(&self) -> impl Iterator<Item = ResourceId> {
        let (primary, secondary) = match *self {
            Descriptor::Null | Descriptor::Sampler(_) => (None, None),
            Descriptor::Cbv { buffer, .. } => (buffer, None),
            Descriptor::Srv { resource, .. }
            | Descriptor::Rtv { resource, .. }
            | Descriptor::Dsv { resource, .. } => (resource, None),
            Descriptor::Uav {
                resource, counter, ..
            } => (resource, counter),
        };
        primary
            .into_iter()
            .chain(secondary)
            .filter(|id| !id.is_null())
    }
}
