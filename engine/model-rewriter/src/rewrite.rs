//! Graph rewrite passes.
//!
//! Third-party KataGo networks ship with a dynamic batch dimension and
//! two operators (Softplus, LogSoftmax) that constrained back-ends punt
//! to the CPU, forcing a per-operator round-trip. Both passes edit the
//! serialised graph directly:
//!
//! 1. Static dimensions: symbolic batch/spatial dims are pinned to
//!    concrete values so the runtime can capture the graph.
//! 2. Operator decomposition: `Softplus(x)` becomes the numerically
//!    stable `Relu(x) + Log(1 + Exp(-Abs(x)))`; `LogSoftmax(x)` becomes
//!    `Softmax(x)` followed by `Log`.
//!
//! Both passes are idempotent and preserve the graph's numeric semantics
//! within the model's element precision.

use prost::Message;
use tracing::{debug, warn};

use crate::proto::tensor_shape_proto::dimension::Value as DimValue;
use crate::proto::type_proto::Value as TypeValue;
use crate::proto::{
    attribute_type, data_type, AttributeProto, GraphProto, ModelProto, NodeProto, TensorProto,
    TensorShapeProto, TypeProto, ValueInfoProto,
};

/// Name of the shared constant-1 initializer added by the decomposition
/// pass. At most one tensor with this name ever exists in a rewritten
/// model.
pub const SHARED_ONE_NAME: &str = "__sente_rewrite_one";

/// Options controlling the static-dimension pass.
#[derive(Debug, Clone)]
pub struct RewriteOptions {
    /// Value written into every symbolic or non-positive first dimension.
    pub target_batch: i64,
    /// When set, named dimensions `batch_size`, `height`, and `width`
    /// are also specialised anywhere they occur (back-ends that require
    /// fully static spatial shapes).
    pub board_size: Option<i64>,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            target_batch: 8,
            board_size: None,
        }
    }
}

impl RewriteOptions {
    /// Profile for GPU graph-capture back-ends.
    pub fn for_graph_capture(target_batch: i64) -> Self {
        Self {
            target_batch,
            board_size: None,
        }
    }

    /// Profile for the neural-coprocessor back-end: batch 1 and fully
    /// static spatial dimensions.
    pub fn for_coprocessor(board_size: i64) -> Self {
        Self {
            target_batch: 1,
            board_size: Some(board_size),
        }
    }
}

/// Result of a rewrite run.
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    /// The rewritten file, or the unmodified input on parse failure.
    pub bytes: Vec<u8>,
    /// False only when the input could not be parsed.
    pub was_converted: bool,
    pub dims_changed: usize,
    pub softplus_replaced: usize,
    pub logsoftmax_replaced: usize,
}

/// Summary of a model's first input declaration, used by the inference
/// engine for element-type and static-batch detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInputInfo {
    pub name: String,
    pub elem_type: i32,
    /// First dimension when it is concrete and positive.
    pub batch_dim: Option<i64>,
}

/// Read the first input declaration of a serialised model. Returns None
/// when the bytes do not parse or the model declares no inputs.
pub fn inspect_first_input(bytes: &[u8]) -> Option<ModelInputInfo> {
    let model = ModelProto::decode(bytes).ok()?;
    let input = model.graph.as_ref()?.input.first()?;
    let tensor = input.tensor_type()?;
    let batch_dim = tensor
        .shape
        .as_ref()
        .and_then(|shape| shape.dim.first())
        .and_then(|dim| match dim.value {
            Some(DimValue::DimValue(v)) if v > 0 => Some(v),
            _ => None,
        });
    Some(ModelInputInfo {
        name: input.name.clone(),
        elem_type: tensor.elem_type,
        batch_dim,
    })
}

/// Run both rewrite passes over a serialised model.
///
/// On any parse failure the original bytes are returned unchanged with
/// `was_converted = false`. Node count only ever grows; a second run over
/// the output is a no-op.
pub fn rewrite_model(bytes: &[u8], options: &RewriteOptions) -> RewriteOutcome {
    let mut model = match ModelProto::decode(bytes) {
        Ok(model) => model,
        Err(err) => {
            warn!(error = %err, "model rewrite skipped: input does not parse");
            return RewriteOutcome {
                bytes: bytes.to_vec(),
                was_converted: false,
                dims_changed: 0,
                softplus_replaced: 0,
                logsoftmax_replaced: 0,
            };
        }
    };

    let Some(graph) = model.graph.as_mut() else {
        warn!("model rewrite skipped: no graph present");
        return RewriteOutcome {
            bytes: bytes.to_vec(),
            was_converted: false,
            dims_changed: 0,
            softplus_replaced: 0,
            logsoftmax_replaced: 0,
        };
    };

    let dims_changed = make_dims_static(graph, options);
    let (softplus_replaced, logsoftmax_replaced) = decompose_ops(graph);

    debug!(
        dims_changed,
        softplus_replaced, logsoftmax_replaced, "model rewrite complete"
    );

    RewriteOutcome {
        bytes: model.encode_to_vec(),
        was_converted: true,
        dims_changed,
        softplus_replaced,
        logsoftmax_replaced,
    }
}

/// Pin symbolic dimensions across graph inputs, outputs, and
/// intermediate value info. Concrete positive dimensions are left alone.
fn make_dims_static(graph: &mut GraphProto, options: &RewriteOptions) -> usize {
    let mut changes = 0;
    for vi in graph
        .input
        .iter_mut()
        .chain(graph.output.iter_mut())
        .chain(graph.value_info.iter_mut())
    {
        let Some(tensor) = vi.tensor_type_mut() else {
            continue;
        };
        let Some(shape) = tensor.shape.as_mut() else {
            continue;
        };
        for (i, dim) in shape.dim.iter_mut().enumerate() {
            let replacement = match (&dim.value, i) {
                (Some(DimValue::DimValue(v)), _) if *v > 0 => None,
                (_, 0) => Some(options.target_batch),
                (Some(DimValue::DimParam(name)), _) => Some(match options.board_size {
                    Some(board) if name == "height" || name == "width" => board,
                    Some(_) if name == "batch_size" => options.target_batch,
                    // Symbolic but unknown to the option set.
                    _ => 1,
                }),
                _ => None,
            };
            if let Some(value) = replacement {
                dim.value = Some(DimValue::DimValue(value));
                dim.denotation.clear();
                changes += 1;
            }
        }
    }
    changes
}

/// Replace Softplus and LogSoftmax nodes with back-end-supported
/// equivalents, adding value-info entries for every new intermediate.
fn decompose_ops(graph: &mut GraphProto) -> (usize, usize) {
    let elem_type = graph
        .input
        .first()
        .and_then(|vi| vi.tensor_type())
        .map(|t| t.elem_type)
        .unwrap_or(data_type::FLOAT);

    // Source shapes for value-info propagation, by tensor name.
    let shape_sources: std::collections::HashMap<String, ValueInfoProto> = graph
        .value_info
        .iter()
        .chain(graph.input.iter())
        .chain(graph.output.iter())
        .map(|vi| (vi.name.clone(), vi.clone()))
        .collect();

    let mut new_nodes = Vec::with_capacity(graph.node.len());
    let mut new_value_infos = Vec::new();
    let mut softplus_count = 0usize;
    let mut logsoftmax_count = 0usize;
    let mut needs_one = false;

    for node in graph.node.drain(..) {
        let decomposable = !node.input.is_empty() && !node.output.is_empty();
        if decomposable && node.op_type == "Softplus" {
            let x = node.input[0].clone();
            let y = node.output[0].clone();
            let p = format!("__sp_{}", softplus_count);

            let abs = format!("{}_abs", p);
            let neg = format!("{}_neg", p);
            let exp = format!("{}_exp", p);
            let add1 = format!("{}_add1", p);
            let log = format!("{}_log", p);
            let relu = format!("{}_relu", p);

            new_nodes.push(simple_node("Abs", &[&x], &abs));
            new_nodes.push(simple_node("Neg", &[&abs], &neg));
            new_nodes.push(simple_node("Exp", &[&neg], &exp));
            new_nodes.push(simple_node("Add", &[&exp, SHARED_ONE_NAME], &add1));
            new_nodes.push(simple_node("Log", &[&add1], &log));
            new_nodes.push(simple_node("Relu", &[&x], &relu));
            new_nodes.push(simple_node("Add", &[&relu, &log], &y));

            let source = shape_sources.get(&x);
            for name in [&abs, &neg, &exp, &add1, &log, &relu] {
                new_value_infos.push(intermediate_value_info(name, elem_type, source));
            }

            softplus_count += 1;
            needs_one = true;
        } else if decomposable && node.op_type == "LogSoftmax" {
            let x = node.input[0].clone();
            let y = node.output[0].clone();
            let softmax_out = format!("__ls_{}_softmax", logsoftmax_count);

            let axis = node
                .attribute
                .iter()
                .find(|a| a.name == "axis")
                .cloned()
                .unwrap_or_else(|| axis_attribute(-1));

            let mut softmax = simple_node("Softmax", &[&x], &softmax_out);
            softmax.attribute.push(axis);
            new_nodes.push(softmax);
            new_nodes.push(simple_node("Log", &[&softmax_out], &y));

            let source = shape_sources.get(&x);
            new_value_infos.push(intermediate_value_info(&softmax_out, elem_type, source));

            logsoftmax_count += 1;
        } else {
            new_nodes.push(node);
        }
    }

    if needs_one && !graph.initializer.iter().any(|t| t.name == SHARED_ONE_NAME) {
        graph.initializer.push(one_constant(elem_type));
    }

    graph.node = new_nodes;
    graph.value_info.extend(new_value_infos);

    (softplus_count, logsoftmax_count)
}

fn simple_node(op_type: &str, inputs: &[&str], output: &str) -> NodeProto {
    NodeProto {
        input: inputs.iter().map(|s| s.to_string()).collect(),
        output: vec![output.to_string()],
        op_type: op_type.to_string(),
        ..Default::default()
    }
}

fn axis_attribute(axis: i64) -> AttributeProto {
    AttributeProto {
        name: "axis".to_string(),
        i: axis,
        r#type: attribute_type::INT,
        ..Default::default()
    }
}

/// Scalar constant 1 in the model's element type. The f16 encoding of
/// 1.0 is the raw byte pair 0x00 0x3C.
fn one_constant(elem_type: i32) -> TensorProto {
    let raw_data = match elem_type {
        data_type::FLOAT16 => vec![0x00, 0x3C],
        _ => 1.0f32.to_le_bytes().to_vec(),
    };
    TensorProto {
        name: SHARED_ONE_NAME.to_string(),
        data_type: if elem_type == data_type::FLOAT16 {
            data_type::FLOAT16
        } else {
            data_type::FLOAT
        },
        raw_data,
        ..Default::default()
    }
}

/// Value info for a decomposition intermediate: element type always set,
/// shape copied from the source tensor when it is known. Replacement ops
/// are element-wise or reduce along the preserved axis, so the source
/// shape applies as-is.
fn intermediate_value_info(
    name: &str,
    elem_type: i32,
    source: Option<&ValueInfoProto>,
) -> ValueInfoProto {
    let shape: Option<TensorShapeProto> = source
        .and_then(|vi| vi.tensor_type())
        .and_then(|t| t.shape.clone());
    ValueInfoProto {
        name: name.to_string(),
        r#type: Some(TypeProto {
            denotation: String::new(),
            value: Some(TypeValue::TensorType(crate::proto::type_proto::Tensor {
                elem_type,
                shape,
            })),
        }),
        doc_string: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::tensor_shape_proto::Dimension;

    fn dim_param(name: &str) -> Dimension {
        Dimension {
            denotation: String::new(),
            value: Some(DimValue::DimParam(name.to_string())),
        }
    }

    fn dim_value(v: i64) -> Dimension {
        Dimension {
            denotation: String::new(),
            value: Some(DimValue::DimValue(v)),
        }
    }

    fn tensor_value_info(name: &str, elem_type: i32, dims: Vec<Dimension>) -> ValueInfoProto {
        ValueInfoProto {
            name: name.to_string(),
            r#type: Some(TypeProto {
                denotation: String::new(),
                value: Some(TypeValue::TensorType(crate::proto::type_proto::Tensor {
                    elem_type,
                    shape: Some(TensorShapeProto { dim: dims }),
                })),
            }),
            doc_string: String::new(),
        }
    }

    /// A model with `softplus_count` Softplus nodes and
    /// `logsoftmax_count` LogSoftmax nodes chained off one input.
    fn test_model(elem_type: i32, softplus_count: usize, logsoftmax_count: usize) -> Vec<u8> {
        let mut nodes = Vec::new();
        let mut previous = "input".to_string();
        for i in 0..softplus_count {
            let out = format!("sp_out_{}", i);
            nodes.push(NodeProto {
                input: vec![previous.clone()],
                output: vec![out.clone()],
                op_type: "Softplus".to_string(),
                ..Default::default()
            });
            previous = out;
        }
        for i in 0..logsoftmax_count {
            let out = format!("ls_out_{}", i);
            nodes.push(NodeProto {
                input: vec![previous.clone()],
                output: vec![out.clone()],
                op_type: "LogSoftmax".to_string(),
                attribute: vec![axis_attribute(1)],
                ..Default::default()
            });
            previous = out;
        }
        nodes.push(NodeProto {
            input: vec![previous],
            output: vec!["output".to_string()],
            op_type: "Identity".to_string(),
            ..Default::default()
        });

        let model = ModelProto {
            ir_version: 8,
            producer_name: "test".to_string(),
            graph: Some(GraphProto {
                name: "g".to_string(),
                node: nodes,
                input: vec![tensor_value_info(
                    "input",
                    elem_type,
                    vec![
                        dim_param("batch_size"),
                        dim_value(22),
                        dim_param("height"),
                        dim_param("width"),
                    ],
                )],
                output: vec![tensor_value_info(
                    "output",
                    elem_type,
                    vec![dim_param("batch_size"), dim_value(362)],
                )],
                ..Default::default()
            }),
            opset_import: vec![crate::proto::OperatorSetIdProto {
                domain: String::new(),
                version: 17,
            }],
            ..Default::default()
        };
        model.encode_to_vec()
    }

    fn decode(bytes: &[u8]) -> ModelProto {
        ModelProto::decode(bytes).unwrap()
    }

    #[test]
    fn test_parse_failure_returns_original() {
        let garbage = vec![0xFFu8; 37];
        let outcome = rewrite_model(&garbage, &RewriteOptions::default());
        assert!(!outcome.was_converted);
        assert_eq!(outcome.bytes, garbage);
    }

    #[test]
    fn test_static_batch_default_eight() {
        let bytes = test_model(data_type::FLOAT, 1, 0);
        let outcome = rewrite_model(&bytes, &RewriteOptions::default());
        assert!(outcome.was_converted);

        let model = decode(&outcome.bytes);
        let graph = model.graph.unwrap();
        for vi in graph.input.iter().chain(graph.output.iter()) {
            let shape = vi.tensor_type().unwrap().shape.as_ref().unwrap();
            assert_eq!(
                shape.dim[0].value,
                Some(DimValue::DimValue(8)),
                "first dim of {} should be the target batch",
                vi.name
            );
        }
    }

    #[test]
    fn test_unknown_symbolic_dims_become_one() {
        let bytes = test_model(data_type::FLOAT, 0, 0);
        let outcome = rewrite_model(&bytes, &RewriteOptions::default());
        let model = decode(&outcome.bytes);
        let graph = model.graph.unwrap();
        let shape = graph.input[0].tensor_type().unwrap().shape.as_ref().unwrap();
        // height/width are symbolic and unknown to the base option set
        assert_eq!(shape.dim[2].value, Some(DimValue::DimValue(1)));
        assert_eq!(shape.dim[3].value, Some(DimValue::DimValue(1)));
        // Concrete positive dims untouched
        assert_eq!(shape.dim[1].value, Some(DimValue::DimValue(22)));
    }

    #[test]
    fn test_coprocessor_profile_specialises_named_dims() {
        let bytes = test_model(data_type::FLOAT, 0, 0);
        let outcome = rewrite_model(&bytes, &RewriteOptions::for_coprocessor(19));
        let model = decode(&outcome.bytes);
        let graph = model.graph.unwrap();
        let shape = graph.input[0].tensor_type().unwrap().shape.as_ref().unwrap();
        assert_eq!(shape.dim[0].value, Some(DimValue::DimValue(1)));
        assert_eq!(shape.dim[2].value, Some(DimValue::DimValue(19)));
        assert_eq!(shape.dim[3].value, Some(DimValue::DimValue(19)));
    }

    #[test]
    fn test_softplus_decomposition_shape() {
        let bytes = test_model(data_type::FLOAT, 1, 0);
        let before_nodes = decode(&bytes).graph.unwrap().node.len();
        let outcome = rewrite_model(&bytes, &RewriteOptions::default());
        assert_eq!(outcome.softplus_replaced, 1);

        let model = decode(&outcome.bytes);
        let graph = model.graph.unwrap();
        assert!(graph.node.iter().all(|n| n.op_type != "Softplus"));
        // One Softplus becomes seven nodes; node count grows monotonically
        assert_eq!(graph.node.len(), before_nodes + 6);
        let ops: Vec<&str> = graph.node.iter().map(|n| n.op_type.as_str()).collect();
        for op in ["Abs", "Neg", "Exp", "Add", "Log", "Relu"] {
            assert!(ops.contains(&op), "missing {} in decomposition", op);
        }
        // Six intermediates gained value info
        assert_eq!(graph.value_info.len(), 6);
        assert_eq!(graph.initializer.len(), 1);
        assert_eq!(graph.initializer[0].name, SHARED_ONE_NAME);
    }

    #[test]
    fn test_logsoftmax_preserves_axis() {
        let bytes = test_model(data_type::FLOAT, 0, 1);
        let outcome = rewrite_model(&bytes, &RewriteOptions::default());
        assert_eq!(outcome.logsoftmax_replaced, 1);

        let model = decode(&outcome.bytes);
        let graph = model.graph.unwrap();
        assert!(graph.node.iter().all(|n| n.op_type != "LogSoftmax"));
        let softmax = graph
            .node
            .iter()
            .find(|n| n.op_type == "Softmax")
            .expect("Softmax node");
        let axis = softmax.attribute.iter().find(|a| a.name == "axis").unwrap();
        assert_eq!(axis.i, 1);
        // LogSoftmax adds no constant
        assert!(graph.initializer.is_empty());
    }

    #[test]
    fn test_fp16_constant_bytes() {
        let bytes = test_model(data_type::FLOAT16, 1, 0);
        let outcome = rewrite_model(&bytes, &RewriteOptions::default());
        let model = decode(&outcome.bytes);
        let one = &model.graph.unwrap().initializer[0];
        assert_eq!(one.data_type, data_type::FLOAT16);
        assert_eq!(one.raw_data, vec![0x00, 0x3C]);
    }

    #[test]
    fn test_fp32_constant_bytes() {
        let bytes = test_model(data_type::FLOAT, 1, 0);
        let outcome = rewrite_model(&bytes, &RewriteOptions::default());
        let model = decode(&outcome.bytes);
        let one = &model.graph.unwrap().initializer[0];
        assert_eq!(one.data_type, data_type::FLOAT);
        assert_eq!(one.raw_data, 1.0f32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_idempotence() {
        let bytes = test_model(data_type::FLOAT, 3, 2);
        let once = rewrite_model(&bytes, &RewriteOptions::default());
        let twice = rewrite_model(&once.bytes, &RewriteOptions::default());
        assert!(twice.was_converted);
        assert_eq!(twice.softplus_replaced, 0);
        assert_eq!(twice.logsoftmax_replaced, 0);
        assert_eq!(twice.dims_changed, 0);
        assert_eq!(once.bytes, twice.bytes);
    }

    #[test]
    fn test_large_model_full_rewrite() {
        // 125 Softplus and 4 LogSoftmax nodes, as in a full KataGo net
        let bytes = test_model(data_type::FLOAT, 125, 4);
        let outcome = rewrite_model(&bytes, &RewriteOptions::default());
        assert_eq!(outcome.softplus_replaced, 125);
        assert_eq!(outcome.logsoftmax_replaced, 4);

        let model = decode(&outcome.bytes);
        let graph = model.graph.unwrap();
        assert!(graph
            .node
            .iter()
            .all(|n| n.op_type != "Softplus" && n.op_type != "LogSoftmax"));
        // Exactly one shared constant despite 125 replacements
        let ones: Vec<_> = graph
            .initializer
            .iter()
            .filter(|t| t.name == SHARED_ONE_NAME)
            .collect();
        assert_eq!(ones.len(), 1);
        // Every declared first dimension is the requested static batch
        for vi in graph.input.iter().chain(graph.output.iter()) {
            let shape = vi.tensor_type().unwrap().shape.as_ref().unwrap();
            assert_eq!(shape.dim[0].value, Some(DimValue::DimValue(8)));
        }
    }

    #[test]
    fn test_decomposition_numerics() {
        // relu(x) + ln(1 + e^{-|x|}) must match ln(1 + e^x) over [-20, 20]
        for i in 0..=400 {
            let x = -20.0f32 + i as f32 * 0.1;
            let reference = (1.0f64 + (x as f64).exp()).ln() as f32;
            let decomposed = x.max(0.0) + (1.0f32 + (-x.abs()).exp()).ln();
            assert!(
                (decomposed - reference).abs() <= 1e-5,
                "mismatch at x={}: {} vs {}",
                x,
                decomposed,
                reference
            );
        }
    }

    #[test]
    fn test_inspect_first_input() {
        let bytes = test_model(data_type::FLOAT16, 0, 0);
        let info = inspect_first_input(&bytes).unwrap();
        assert_eq!(info.name, "input");
        assert_eq!(info.elem_type, data_type::FLOAT16);
        // Symbolic batch: no static dim reported
        assert_eq!(info.batch_dim, None);

        let rewritten = rewrite_model(&bytes, &RewriteOptions::default());
        let info = inspect_first_input(&rewritten.bytes).unwrap();
        assert_eq!(info.batch_dim, Some(8));

        assert!(inspect_first_input(&[0xFF, 0xFF, 0xFF]).is_none());
    }

    #[test]
    fn test_unknown_fields_of_modelled_messages_survive() {
        let bytes = test_model(data_type::FLOAT, 1, 0);
        let mut model = decode(&bytes);
        model.metadata_props.push(crate::proto::StringStringEntryProto {
            key: "converter".to_string(),
            value: "kata-export".to_string(),
        });
        let outcome = rewrite_model(&model.encode_to_vec(), &RewriteOptions::default());
        let round_tripped = decode(&outcome.bytes);
        assert_eq!(round_tripped.metadata_props.len(), 1);
        assert_eq!(round_tripped.metadata_props[0].key, "converter");
        assert_eq!(round_tripped.producer_name, "test");
        assert_eq!(round_tripped.opset_import[0].version, 17);
    }
}
