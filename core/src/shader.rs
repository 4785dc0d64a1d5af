use std::collections::BTreeMap;
use std::fmt::Write;
use std::ops::BitOr;

use ahash::RandomState;
use once_cell::sync::Lazy;

// Fixed seeds keep fingerprints comparable for the whole process lifetime.
static FINGERPRINT: Lazy<RandomState> = Lazy::new(|| {
    RandomState::with_seeds(
        0x5bd1_e995_9e37_79b9,
        0xc2b2_ae3d_27d4_eb4f,
        0x1656_67b1_9e37_79f9,
        0x85eb_ca77_c2b2_ae63,
    )
});

/// 32-bit fingerprint of arbitrary data.
pub fn fingerprint<T: std::hash::Hash + ?Sized>(data: &T) -> u32 {
    let hash = FINGERPRINT.hash_one(data);
    (hash ^ (hash >> 32)) as u32
}

#[derive(Copy, Clone, Debug, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    TessellationControl,
    TessellationEvaluation,
    Geometry,
    Fragment,
    Compute,
    Task,
    Mesh,
    RayGeneration,
    AnyHit,
    ClosestHit,
    Miss,
    Intersection,
    Callable,
}

impl ShaderStage {
    pub fn abbreviation(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "VS",
            ShaderStage::TessellationControl => "HS",
            ShaderStage::TessellationEvaluation => "DS",
            ShaderStage::Geometry => "GS",
            ShaderStage::Fragment => "PS",
            ShaderStage::Compute => "CS",
            ShaderStage::Task => "TS",
            ShaderStage::Mesh => "MS",
            ShaderStage::RayGeneration => "RGEN",
            ShaderStage::AnyHit => "aHIT",
            ShaderStage::ClosestHit => "cHIT",
            ShaderStage::Miss => "MISS",
            ShaderStage::Intersection => "INT",
            ShaderStage::Callable => "CALL",
        }
    }

    /// Converts a single `VkShaderStageFlagBits` value.
    pub fn from_vk(flag: u32) -> Option<Self> {
        Some(match flag {
            0x1 => ShaderStage::Vertex,
            0x2 => ShaderStage::TessellationControl,
            0x4 => ShaderStage::TessellationEvaluation,
            0x8 => ShaderStage::Geometry,
            0x10 => ShaderStage::Fragment,
            0x20 => ShaderStage::Compute,
            0x40 => ShaderStage::Task,
            0x80 => ShaderStage::Mesh,
            0x100 => ShaderStage::RayGeneration,
            0x200 => ShaderStage::AnyHit,
            0x400 => ShaderStage::ClosestHit,
            0x800 => ShaderStage::Miss,
            0x1000 => ShaderStage::Intersection,
            0x2000 => ShaderStage::Callable,
            _ => return None,
        })
    }

    pub fn bind_point(self) -> BindPoint {
        match self {
            ShaderStage::Compute => BindPoint::Compute,
            ShaderStage::RayGeneration
            | ShaderStage::AnyHit
            | ShaderStage::ClosestHit
            | ShaderStage::Miss
            | ShaderStage::Intersection
            | ShaderStage::Callable => BindPoint::RayTracing,
            _ => BindPoint::Graphics,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BindPoint {
    Graphics,
    Compute,
    RayTracing,
}

impl BindPoint {
    /// Converts a `VkPipelineBindPoint` value.
    pub fn from_vk(bind_point: u32) -> Option<Self> {
        match bind_point {
            0 => Some(BindPoint::Graphics),
            1 => Some(BindPoint::Compute),
            1_000_165_000 => Some(BindPoint::RayTracing),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderCapabilities {
    pub ray_query: bool,
    pub ray_tracing: bool,
}

impl ShaderCapabilities {
    const SPIRV_MAGIC: u32 = 0x0723_0203;
    const SPIRV_HEADER_WORDS: usize = 5;
    const OP_CAPABILITY: u32 = 17;

    const RAY_QUERY_PROVISIONAL: u32 = 4471;
    const RAY_QUERY: u32 = 4472;
    const RAY_TRACING: u32 = 4479;
    const RAY_TRACING_PROVISIONAL: u32 = 5353;

    /// Scans the capability declarations at the start of a SPIR-V module.
    pub fn from_spirv(code: &[u32]) -> Self {
        let mut caps = Self::default();
        if code.first() != Some(&Self::SPIRV_MAGIC) {
            return caps;
        }

        let mut words = code.get(Self::SPIRV_HEADER_WORDS..).unwrap_or_default();
        while let [instruction, operand, ..] = *words {
            if instruction & 0xffff != Self::OP_CAPABILITY || instruction >> 16 != 2 {
                break;
            }
            match operand {
                Self::RAY_QUERY | Self::RAY_QUERY_PROVISIONAL => caps.ray_query = true,
                Self::RAY_TRACING | Self::RAY_TRACING_PROVISIONAL => caps.ray_tracing = true,
                _ => {}
            }
            words = &words[2..];
        }
        caps
    }
}

impl BitOr for ShaderCapabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            ray_query: self.ray_query || rhs.ray_query,
            ray_tracing: self.ray_tracing || rhs.ray_tracing,
        }
    }
}

/// Per-stage shader hashes of a pipeline or a set of bound shader objects.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderTuple {
    stages: BTreeMap<ShaderStage, u32>,
    hash: u32,
    capabilities: ShaderCapabilities,
}

impl ShaderTuple {
    pub fn new(
        stages: impl IntoIterator<Item = (ShaderStage, u32)>,
        capabilities: ShaderCapabilities,
    ) -> Self {
        let stages: BTreeMap<_, _> = stages.into_iter().collect();
        let hash = fingerprint(&stages);
        Self {
            stages,
            hash,
            capabilities,
        }
    }

    /// Combined hash used to group drawcalls by shader combination.
    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn stage(&self, stage: ShaderStage) -> Option<u32> {
        self.stages.get(&stage).copied()
    }

    pub fn stages(&self) -> impl Iterator<Item = (ShaderStage, u32)> + '_ {
        self.stages.iter().map(|(stage, hash)| (*stage, *hash))
    }

    pub fn capabilities(&self) -> ShaderCapabilities {
        self.capabilities
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Name built from the hashes of the stages that identify a pipeline of this kind,
    /// e.g. `VS=0123abcd, PS=4567ef01`.
    pub fn default_name(&self, bind_point: BindPoint) -> String {
        let stages: &[ShaderStage] = match bind_point {
            BindPoint::Graphics => &[ShaderStage::Vertex, ShaderStage::Fragment],
            BindPoint::Compute => &[ShaderStage::Compute],
            BindPoint::RayTracing => &[
                ShaderStage::RayGeneration,
                ShaderStage::AnyHit,
                ShaderStage::ClosestHit,
            ],
        };

        let mut name = String::new();
        for (i, stage) in stages.iter().enumerate() {
            if i > 0 {
                name.push_str(", ");
            }
            let _ = write!(
                name,
                "{}={:08x}",
                stage.abbreviation(),
                self.stage(*stage).unwrap_or(0)
            );
        }
        name
    }
}
