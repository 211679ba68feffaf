use ash::vk;

use super::graph::RgGraphPhase;
use super::resource_handle::RgResourceKind;

/// RenderGraph 的可恢复错误
///
/// 全部由 `compile()` / `execute()` 返回；出错时之前的编译结果保持不变。
#[derive(Debug, thiserror::Error)]
pub enum RgError {
    #[error("failed to allocate transient {kind} \"{name}\": {result}")]
    AllocationFailed {
        name: String,
        kind: RgResourceKind,
        result: vk::Result,
    },

    #[error("cyclic dependency between passes: {passes:?}")]
    CyclicDependency { passes: Vec<String> },

    #[error("pass \"{pass}\": pipeline has no binding named \"{binding}\"")]
    UnknownBinding { pass: String, binding: String },

    #[error("pass \"{pass}\": binding \"{binding}\" is {descriptor_type:?}, cannot bind a {kind}")]
    BindingTypeMismatch {
        pass: String,
        binding: String,
        descriptor_type: vk::DescriptorType,
        kind: RgResourceKind,
    },

    #[error("pass \"{pass}\": \"{resource}\" is declared with conflicting layouts {first:?} and {second:?}")]
    ConflictingLayouts {
        pass: String,
        resource: String,
        first: vk::ImageLayout,
        second: vk::ImageLayout,
    },

    #[error("pass \"{pass}\" uses a {kind} handle that is not valid in this frame")]
    InvalidHandle { pass: String, kind: RgResourceKind },

    #[error("pass \"{pass}\" runs after unknown pass \"{target}\"")]
    UnknownPass { pass: String, target: String },

    #[error("render graph has not been compiled")]
    NotCompiled,

    #[error("{operation} is not allowed in phase {phase:?}")]
    InvalidPhase {
        operation: &'static str,
        phase: RgGraphPhase,
    },
}

pub type RgResult<T> = Result<T, RgError>;
