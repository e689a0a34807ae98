//! Compute back-end identifiers and execution-provider negotiation.
//!
//! Back-ends are tried in preference order; the first whose execution
//! provider is present on the host wins. The portable-bytecode back-end
//! always succeeds and is the implicit last resort: when the engine ends
//! up there, graph capture and device-side input binding are disabled.

use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider, DirectMLExecutionProvider,
    ExecutionProvider, ExecutionProviderDispatch, TensorRTExecutionProvider,
};
use serde::{Deserialize, Serialize};

/// A compute back-end the engine can be asked to run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Portable interpreter path. Always available, never captures.
    PortableBytecode,
    /// General-purpose GPU compute with graph capture.
    GpuCompute,
    /// Dedicated neural coprocessor; requires fully static shapes.
    NeuralCoprocessor,
    /// Platform-default native runtime.
    Native,
    NativeCpu,
    /// Native GPU tensor runtime.
    NativeGpuTensor,
}

impl Backend {
    /// Back-ends that cannot compile models with symbolic dimensions and
    /// therefore gate the auto-rewrite of uploaded models.
    pub fn requires_static_shapes(self) -> bool {
        matches!(self, Backend::GpuCompute | Backend::NeuralCoprocessor)
    }

    /// Back-ends on which the runtime can record and replay the device
    /// command stream.
    pub fn supports_graph_capture(self) -> bool {
        matches!(self, Backend::GpuCompute | Backend::NativeGpuTensor)
    }

    /// The execution provider backing this back-end, when one is
    /// registered and available on the host.
    pub fn execution_provider(self) -> Option<ExecutionProviderDispatch> {
        match self {
            Backend::PortableBytecode | Backend::NativeCpu => {
                Some(CPUExecutionProvider::default().build())
            }
            Backend::GpuCompute => {
                let ep = CUDAExecutionProvider::default();
                ep.is_available().unwrap_or(false).then(|| ep.build())
            }
            Backend::NeuralCoprocessor => {
                let coreml = CoreMLExecutionProvider::default();
                if coreml.is_available().unwrap_or(false) {
                    return Some(coreml.build());
                }
                let directml = DirectMLExecutionProvider::default();
                directml.is_available().unwrap_or(false).then(|| directml.build())
            }
            Backend::Native => Some(CPUExecutionProvider::default().build()),
            Backend::NativeGpuTensor => {
                let ep = TensorRTExecutionProvider::default();
                ep.is_available().unwrap_or(false).then(|| ep.build())
            }
        }
    }

    /// Whether this back-end can be constructed on the current host.
    pub fn is_available(self) -> bool {
        self.execution_provider().is_some()
    }

    /// Default preference order used when the caller supplies none.
    pub fn default_preference() -> Vec<Backend> {
        vec![Backend::GpuCompute, Backend::Native, Backend::PortableBytecode]
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Backend::PortableBytecode => "portable-bytecode",
            Backend::GpuCompute => "gpu-compute",
            Backend::NeuralCoprocessor => "neural-coprocessor",
            Backend::Native => "native",
            Backend::NativeCpu => "native-cpu",
            Backend::NativeGpuTensor => "native-gpu-tensor",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_kebab_names() {
        let json = serde_json::to_string(&Backend::GpuCompute).unwrap();
        assert_eq!(json, "\"gpu-compute\"");
        let parsed: Backend = serde_json::from_str("\"portable-bytecode\"").unwrap();
        assert_eq!(parsed, Backend::PortableBytecode);
    }

    #[test]
    fn test_display_matches_serde() {
        for backend in [
            Backend::PortableBytecode,
            Backend::GpuCompute,
            Backend::NeuralCoprocessor,
            Backend::Native,
            Backend::NativeCpu,
            Backend::NativeGpuTensor,
        ] {
            let json = serde_json::to_string(&backend).unwrap();
            assert_eq!(json.trim_matches('"'), backend.to_string());
        }
    }

    #[test]
    fn test_static_shape_backends() {
        assert!(Backend::GpuCompute.requires_static_shapes());
        assert!(Backend::NeuralCoprocessor.requires_static_shapes());
        assert!(!Backend::PortableBytecode.requires_static_shapes());
    }

    #[test]
    fn test_portable_always_available() {
        assert!(Backend::PortableBytecode.is_available());
        assert!(Backend::NativeCpu.is_available());
    }
}
