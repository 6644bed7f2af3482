use crate::axis::{
    dynamic_axes_from_internal_dynamic_axis_name, internal_dynamic_axis_name_from_dynamic_axes,
};
use crate::composite::Composite;
use crate::dict::{DictValue, Dictionary};
use crate::dtype::DType;
use crate::error::NervaError;
use crate::graph::Graph;
use crate::node::{node_id, NodeId, Op, Primitive};
use crate::shape::Shape;
use crate::traverse::traverse;
use crate::value::{Data, Value};
use crate::variable::{var_id, VarId, VarKind, Variable};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// Current serialization version.
///
/// Version history:
/// 1 -- initial version.
/// 2 -- adds RNG state of stateful nodes (dropout seeds).
pub const SERIALIZATION_VERSION: i64 = 2;

/// Serialize `composite` into a dictionary capturing the full owned node
/// set, the root, and per-node metadata including stateful RNG state.
/// Compiled-network caches are derived state and are not persisted.
#[must_use]
pub fn serialize(composite: &Composite) -> Dictionary {
    // Node and variable uids are dense indices in traversal order, so
    // serialization is canonical for isomorphic graphs.
    let graph = composite.graph();
    let mut node_order = Vec::new();
    let mut visited = BTreeSet::new();
    traverse(graph, composite.root(), &mut visited, &mut |nid| {
        node_order.push(nid);
    });
    let node_uid: BTreeMap<NodeId, usize> =
        node_order.iter().enumerate().map(|(i, &n)| (n, i)).collect();
    let mut var_order: Vec<VarId> = Vec::new();
    let mut var_uid: BTreeMap<VarId, usize> = BTreeMap::new();
    for &nid in &node_order {
        let prim = graph.prim(nid);
        for &x in prim.inputs.iter().chain(prim.outputs.iter()) {
            if !var_uid.contains_key(&x) {
                var_uid.insert(x, var_order.len());
                var_order.push(x);
            }
        }
    }

    let mut vars = Vec::new();
    for &x in &var_order {
        let v = graph.var(x);
        let mut entry = Dictionary::new();
        entry.insert("uid", DictValue::Int(var_uid[&x] as i64));
        entry.insert("name", DictValue::Str(v.name.clone()));
        entry.insert("shape", shape_to_dict(&v.shape));
        entry.insert("dtype", DictValue::Str(v.dtype.tag().into()));
        match &v.kind {
            VarKind::Input => {
                entry.insert("kind", DictValue::Str("input".into()));
                // Inputs always carry at least one dynamic axis, so the
                // internal name is well formed here.
                let axes = internal_dynamic_axis_name_from_dynamic_axes(&v.dynamic_axes)
                    .unwrap_or_default();
                entry.insert("dynamic_axes", DictValue::Str(axes));
            }
            VarKind::Parameter { value, .. } => {
                entry.insert("kind", DictValue::Str("parameter".into()));
                entry.insert("value", data_to_dict(value.data()));
            }
            VarKind::Constant { value } => {
                entry.insert("kind", DictValue::Str("constant".into()));
                entry.insert("value", data_to_dict(value.data()));
            }
            VarKind::Placeholder => {
                entry.insert("kind", DictValue::Str("placeholder".into()));
            }
            VarKind::Output { owner, index } => {
                entry.insert("kind", DictValue::Str("output".into()));
                entry.insert("owner", DictValue::Int(node_uid[owner] as i64));
                entry.insert("output_index", DictValue::Int(*index as i64));
            }
        }
        vars.push(DictValue::Dict(entry));
    }

    let mut prims = Vec::new();
    for &nid in &node_order {
        let prim = graph.prim(nid);
        let mut entry = Dictionary::new();
        entry.insert("uid", DictValue::Int(node_uid[&nid] as i64));
        entry.insert("name", DictValue::Str(prim.name.clone()));
        entry.insert("op", DictValue::Str(prim.op.tag().into()));
        if let Op::Dropout { rate, seed } = prim.op {
            let mut attrs = Dictionary::new();
            attrs.insert("rate", DictValue::Float(rate));
            attrs.insert("rng_seed", DictValue::Int(seed as i64));
            entry.insert("attributes", DictValue::Dict(attrs));
        }
        entry.insert(
            "inputs",
            DictValue::List(
                prim.inputs
                    .iter()
                    .map(|x| DictValue::Int(var_uid[x] as i64))
                    .collect(),
            ),
        );
        entry.insert(
            "outputs",
            DictValue::List(
                prim.outputs
                    .iter()
                    .map(|x| DictValue::Int(var_uid[x] as i64))
                    .collect(),
            ),
        );
        prims.push(DictValue::Dict(entry));
    }

    let mut dict = Dictionary::new();
    dict.insert("version", DictValue::Int(SERIALIZATION_VERSION));
    dict.insert("variables", DictValue::List(vars));
    dict.insert("primitives", DictValue::List(prims));
    dict.insert(
        "root",
        DictValue::Int(node_uid[&composite.root()] as i64),
    );
    dict
}

/// Reconstruct a composite graph from a dictionary produced by
/// [serialize]. Branches on the stored version: version 1 dictionaries
/// predate stateful-node support, so their dropout nodes get a fresh
/// zero seed. Unknown versions are a construction error.
pub fn deserialize(dict: &Dictionary) -> Result<Composite, NervaError> {
    let version = dict.get_int("version")?;
    if version != 1 && version != SERIALIZATION_VERSION {
        return Err(NervaError::UnknownSerializationVersion(version));
    }
    let var_entries = dict.get_list("variables")?;
    let prim_entries = dict.get_list("primitives")?;

    let mut graph = Graph::new();
    for (i, entry) in var_entries.iter().enumerate() {
        let DictValue::Dict(entry) = entry else {
            return Err(NervaError::MalformedDictionary(
                "variable entry is not a dictionary".into(),
            ));
        };
        if entry.get_int("uid")? != i as i64 {
            return Err(NervaError::MalformedDictionary(
                "variable uids are not dense".into(),
            ));
        }
        let name = entry.get_str("name")?.to_string();
        let shape = shape_from_dict(entry.get("shape"), "shape")?;
        let dtype = DType::from_tag(entry.get_str("dtype")?)?;
        let (kind, dynamic_axes) = match entry.get_str("kind")? {
            "input" => {
                let internal_name = entry.get_str("dynamic_axes")?;
                if internal_name.is_empty() {
                    return Err(NervaError::MalformedDictionary(
                        "input variable has an empty dynamic axis name".into(),
                    ));
                }
                (
                    VarKind::Input,
                    dynamic_axes_from_internal_dynamic_axis_name(internal_name),
                )
            }
            "parameter" => (
                VarKind::Parameter {
                    value: value_from_dict(entry.get("value"), &shape, dtype)?,
                    revision: 0,
                },
                Vec::new(),
            ),
            "constant" => (
                VarKind::Constant {
                    value: value_from_dict(entry.get("value"), &shape, dtype)?,
                },
                Vec::new(),
            ),
            "placeholder" => (VarKind::Placeholder, Vec::new()),
            "output" => {
                let owner = entry.get_int("owner")?;
                let index = entry.get_int("output_index")?;
                if owner < 0 || owner as usize >= prim_entries.len() {
                    return Err(NervaError::MalformedDictionary(
                        "output owner is out of range".into(),
                    ));
                }
                (
                    VarKind::Output {
                        owner: node_id(owner as usize),
                        index: index as usize,
                    },
                    Vec::new(),
                )
            }
            other => {
                return Err(NervaError::MalformedDictionary(format!(
                    "unknown variable kind {other:?}"
                )))
            }
        };
        graph.push_var(Variable {
            name,
            shape,
            dtype,
            kind,
            dynamic_axes,
        });
    }

    for (i, entry) in prim_entries.iter().enumerate() {
        let DictValue::Dict(entry) = entry else {
            return Err(NervaError::MalformedDictionary(
                "primitive entry is not a dictionary".into(),
            ));
        };
        if entry.get_int("uid")? != i as i64 {
            return Err(NervaError::MalformedDictionary(
                "primitive uids are not dense".into(),
            ));
        }
        let name = entry.get_str("name")?.to_string();
        let op = op_from_tag(entry, version)?;
        let inputs = var_list(entry.get_list("inputs")?, graph.num_vars())?;
        let outputs = var_list(entry.get_list("outputs")?, graph.num_vars())?;
        if inputs.len() != op.arity() {
            return Err(NervaError::MalformedDictionary(format!(
                "{} expects {} inputs, got {}",
                op.tag(),
                op.arity(),
                inputs.len()
            )));
        }
        graph.push_prim(Primitive {
            op,
            inputs,
            outputs,
            name,
        });
    }

    let root = dict.get_int("root")?;
    if root < 0 || root as usize >= graph.num_prims() {
        return Err(NervaError::MalformedDictionary(
            "root node is out of range".into(),
        ));
    }
    Composite::new(graph, node_id(root as usize))
}

fn shape_to_dict(shape: &Shape) -> DictValue {
    DictValue::List(shape.iter().map(|&d| DictValue::Int(d as i64)).collect())
}

fn shape_from_dict(value: Option<&DictValue>, key: &str) -> Result<Shape, NervaError> {
    let Some(DictValue::List(dims)) = value else {
        return Err(NervaError::MalformedDictionary(format!(
            "expected a list under key {key:?}"
        )));
    };
    let mut out = Vec::with_capacity(dims.len());
    for d in dims {
        let DictValue::Int(d) = d else {
            return Err(NervaError::MalformedDictionary(
                "shape dimension is not an integer".into(),
            ));
        };
        if *d < 0 {
            return Err(NervaError::MalformedDictionary(
                "shape dimension is negative".into(),
            ));
        }
        out.push(*d as usize);
    }
    Ok(Shape::from(out))
}

fn data_to_dict(data: &Data) -> DictValue {
    DictValue::List(match data {
        Data::F32(data) => data.iter().map(|&x| DictValue::Float(x as f64)).collect(),
        Data::F64(data) => data.iter().map(|&x| DictValue::Float(x)).collect(),
        Data::I32(data) => data.iter().map(|&x| DictValue::Int(x as i64)).collect(),
    })
}

fn value_from_dict(
    value: Option<&DictValue>,
    shape: &Shape,
    dtype: DType,
) -> Result<Value, NervaError> {
    let Some(DictValue::List(items)) = value else {
        return Err(NervaError::MalformedDictionary(
            "expected a list under key \"value\"".into(),
        ));
    };
    let data = match dtype {
        DType::F32 => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let DictValue::Float(x) = item else {
                    return Err(NervaError::MalformedDictionary(
                        "value element is not a float".into(),
                    ));
                };
                out.push(*x as f32);
            }
            Data::F32(out)
        }
        DType::F64 => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let DictValue::Float(x) = item else {
                    return Err(NervaError::MalformedDictionary(
                        "value element is not a float".into(),
                    ));
                };
                out.push(*x);
            }
            Data::F64(out)
        }
        DType::I32 => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let DictValue::Int(x) = item else {
                    return Err(NervaError::MalformedDictionary(
                        "value element is not an integer".into(),
                    ));
                };
                out.push(*x as i32);
            }
            Data::I32(out)
        }
    };
    Value::new(shape.clone(), data)
}

fn op_from_tag(entry: &Dictionary, version: i64) -> Result<Op, NervaError> {
    Ok(match entry.get_str("op")? {
        "add" => Op::Add,
        "sub" => Op::Sub,
        "mul" => Op::Mul,
        "div" => Op::Div,
        "pow" => Op::Pow,
        "neg" => Op::Neg,
        "relu" => Op::Relu,
        "exp" => Op::Exp,
        "ln" => Op::Ln,
        "tanh" => Op::Tanh,
        "sqrt" => Op::Sqrt,
        "sum_all" => Op::SumAll,
        "dropout" => {
            // Version 1 predates RNG state in the container.
            let (rate, seed) = if version >= 2 {
                let attrs = entry.get_dict("attributes")?;
                (attrs.get_float("rate")?, attrs.get_int("rng_seed")? as u64)
            } else {
                let attrs = entry.get_dict("attributes")?;
                (attrs.get_float("rate")?, 0)
            };
            Op::Dropout { rate, seed }
        }
        other => {
            return Err(NervaError::MalformedDictionary(format!(
                "unknown op tag {other:?}"
            )))
        }
    })
}

fn var_list(items: &[DictValue], num_vars: usize) -> Result<Vec<VarId>, NervaError> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let DictValue::Int(x) = item else {
            return Err(NervaError::MalformedDictionary(
                "variable reference is not an integer".into(),
            ));
        };
        if *x < 0 || *x as usize >= num_vars {
            return Err(NervaError::MalformedDictionary(
                "variable reference is out of range".into(),
            ));
        }
        out.push(var_id(*x as usize));
    }
    Ok(out)
}
