//! Sandboxed scripts for the primitive-combination surface.
//!
//! Scripts are `evalexpr` expressions. Modeling functions never touch
//! geometry: they record scene operations and hand back an opaque handle
//! (`"solid#N"`), so a script compiles down to a [`SceneDescription`] that
//! the build module evaluates afterwards.
//!
//! ```text
//! base = cube(20, 20, 5);
//! hole = cylinder(4, 10);
//! model = difference(base, hole)
//! ```

use std::sync::{Arc, Mutex};

use evalexpr::{
    eval_with_context_mut, Context, ContextWithMutableFunctions, ContextWithMutableVariables,
    EvalexprError, EvalexprResult, Function, HashMapContext, IterateVariablesContext, Value,
};
use shared::{BooleanOp, Bounds, Primitive, SceneDescription, SceneOperation, Transform};

use super::build::{self, BuildError};

pub const MAX_SOURCE_LEN: usize = 64 * 1024;
pub const MAX_SOLIDS: usize = build::MAX_OPERATIONS;
/// Bound on [`expression_depth`]; the evaluator recurses once per level
pub const MAX_DEPTH: usize = 128;

const HANDLE_PREFIX: &str = "solid#";
const RESULT_VARIABLES: [&str; 2] = ["model", "result"];
const CONSTANTS: [&str; 2] = ["pi", "tau"];

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("Script is empty")]
    Empty,

    #[error("Script is too long ({len} bytes, max {max})")]
    TooLong { len: usize, max: usize },

    #[error("Script nests too deeply (depth {depth}, max {max})")]
    TooDeep { depth: usize, max: usize },

    #[error("{0}")]
    Eval(#[from] EvalexprError),

    #[error("'{0}' does not hold a solid")]
    NotASolid(String),

    #[error("No 'model' variable found. Available variables: {}", .0.join(", "))]
    NoResult(Vec<String>),

    #[error(transparent)]
    Build(#[from] BuildError),
}

/// A script turned into scene operations
#[derive(Debug, Clone)]
pub struct CompiledScript {
    pub scene: SceneDescription,
    pub result: String,
    pub warnings: Vec<String>,
}

/// A compiled script together with its exported mesh
#[derive(Debug, Clone)]
pub struct ScriptRun {
    pub compiled: CompiledScript,
    pub stl: Vec<u8>,
    pub bounds: Bounds,
    pub triangle_count: usize,
}

#[derive(Default)]
struct Recorder {
    operations: Vec<SceneOperation>,
}

impl Recorder {
    fn record(&mut self, op: impl FnOnce(String) -> SceneOperation) -> EvalexprResult<Value> {
        if self.operations.len() >= MAX_SOLIDS {
            return Err(fail(format!("too many solids (max {})", MAX_SOLIDS)));
        }
        let id = format!("{}{}", HANDLE_PREFIX, self.operations.len() + 1);
        self.operations.push(op(id.clone()));
        Ok(Value::String(id))
    }

    fn is_handle(&self, s: &str) -> bool {
        s.strip_prefix(HANDLE_PREFIX)
            .and_then(|n| n.parse::<usize>().ok())
            .is_some_and(|n| n >= 1 && n <= self.operations.len())
    }
}

type Shared = Arc<Mutex<Recorder>>;

fn fail(message: impl Into<String>) -> EvalexprError {
    EvalexprError::CustomMessage(message.into())
}

fn with_recorder<T>(rec: &Shared, f: impl FnOnce(&mut Recorder) -> EvalexprResult<T>) -> EvalexprResult<T> {
    let mut guard = rec.lock().map_err(|_| fail("script state poisoned"))?;
    f(&mut guard)
}

/// `arity` numeric arguments; a single one arrives bare, several as a tuple
fn numbers(arg: &Value, arity: usize, name: &str) -> EvalexprResult<Vec<f64>> {
    let values = if arity == 1 {
        vec![arg.clone()]
    } else {
        arg.as_tuple()
            .map_err(|_| fail(format!("{} expects {} arguments", name, arity)))?
    };
    if values.len() != arity {
        return Err(fail(format!("{} expects {} arguments, got {}", name, arity, values.len())));
    }
    values
        .iter()
        .map(|v| v.as_number().map_err(|_| fail(format!("{}: '{}' is not a number", name, v))))
        .collect()
}

fn solid(rec: &Recorder, value: &Value, name: &str) -> EvalexprResult<String> {
    match value {
        Value::String(s) if rec.is_handle(s) => Ok(s.clone()),
        other => Err(fail(format!("{}: expected a solid, got '{}'", name, other))),
    }
}

fn tuple(arg: &Value, len: usize, name: &str) -> EvalexprResult<Vec<Value>> {
    let values = arg
        .as_tuple()
        .map_err(|_| fail(format!("{} expects {} arguments", name, len)))?;
    if values.len() != len {
        return Err(fail(format!("{} expects {} arguments, got {}", name, len, values.len())));
    }
    Ok(values)
}

fn primitive_fn(
    rec: Shared,
    name: &'static str,
    arity: usize,
    make: fn(&[f64]) -> Primitive,
) -> impl Fn(&Value) -> EvalexprResult<Value> + Clone + Send + Sync + 'static {
    move |arg: &Value| {
        let dims = numbers(arg, arity, name)?;
        let primitive = make(&dims);
        if !primitive.is_valid() {
            return Err(fail(format!("{}: dimensions must be positive", name)));
        }
        with_recorder(&rec, |r| {
            r.record(|id| SceneOperation::CreatePrimitive {
                id,
                primitive,
                transform: Transform::new(),
            })
        })
    }
}

fn transform_fn(
    rec: Shared,
    name: &'static str,
    make: fn(f64, f64, f64) -> Transform,
) -> impl Fn(&Value) -> EvalexprResult<Value> + Clone + Send + Sync + 'static {
    move |arg: &Value| {
        let args = tuple(arg, 4, name)?;
        let xyz = numbers(&Value::Tuple(args[1..].to_vec()), 3, name)?;
        let transform = make(xyz[0], xyz[1], xyz[2]);
        with_recorder(&rec, |r| {
            let source = solid(r, &args[0], name)?;
            r.record(|id| SceneOperation::Transform { id, source, transform })
        })
    }
}

fn boolean_fn(
    rec: Shared,
    name: &'static str,
    op: BooleanOp,
) -> impl Fn(&Value) -> EvalexprResult<Value> + Clone + Send + Sync + 'static {
    move |arg: &Value| {
        let args = tuple(arg, 2, name)?;
        with_recorder(&rec, |r| {
            let left = solid(r, &args[0], name)?;
            let right = solid(r, &args[1], name)?;
            r.record(|id| SceneOperation::Boolean { id, op, left, right })
        })
    }
}

fn sandbox(rec: &Shared) -> Result<HashMapContext, ScriptError> {
    let mut ctx = HashMapContext::new();

    let primitives: [(&'static str, usize, fn(&[f64]) -> Primitive); 6] = [
        ("cube", 3, |d| Primitive::Cube { width: d[0], height: d[1], depth: d[2] }),
        ("box", 3, |d| Primitive::Cube { width: d[0], height: d[1], depth: d[2] }),
        ("cylinder", 2, |d| Primitive::Cylinder { radius: d[0], height: d[1] }),
        ("sphere", 1, |d| Primitive::Sphere { radius: d[0] }),
        ("cone", 2, |d| Primitive::Cone { radius: d[0], height: d[1] }),
        ("torus", 2, |d| Primitive::Torus { major_radius: d[0], minor_radius: d[1] }),
    ];
    for (name, arity, make) in primitives {
        ctx.set_function(name.into(), Function::new(primitive_fn(rec.clone(), name, arity, make)))?;
    }

    let transforms: [(&'static str, fn(f64, f64, f64) -> Transform); 3] = [
        ("translate", Transform::translation),
        ("rotate", Transform::rotation),
        ("scale", Transform::scaling),
    ];
    for (name, make) in transforms {
        ctx.set_function(name.into(), Function::new(transform_fn(rec.clone(), name, make)))?;
    }

    for (name, op) in [
        ("union", BooleanOp::Union),
        ("difference", BooleanOp::Difference),
        ("intersection", BooleanOp::Intersection),
    ] {
        ctx.set_function(name.into(), Function::new(boolean_fn(rec.clone(), name, op)))?;
    }

    ctx.set_value("pi".into(), Value::Float(std::f64::consts::PI))?;
    ctx.set_value("tau".into(), Value::Float(std::f64::consts::TAU))?;
    Ok(ctx)
}

/// Evaluate a script into scene operations and pick its result solid
pub fn compile(source: &str) -> Result<CompiledScript, ScriptError> {
    if source.trim().is_empty() {
        return Err(ScriptError::Empty);
    }
    if source.len() > MAX_SOURCE_LEN {
        return Err(ScriptError::TooLong { len: source.len(), max: MAX_SOURCE_LEN });
    }
    let depth = expression_depth(source);
    if depth > MAX_DEPTH {
        return Err(ScriptError::TooDeep { depth, max: MAX_DEPTH });
    }

    let recorder: Shared = Arc::default();
    let mut ctx = sandbox(&recorder)?;
    eval_with_context_mut(source, &mut ctx)?;

    let operations = recorder
        .lock()
        .map(|mut r| std::mem::take(&mut r.operations))
        .map_err(|_| fail("script state poisoned"))?;

    let recorded = Recorder { operations };
    let mut warnings = Vec::new();
    let result = pick_result(&ctx, &recorded, &mut warnings)?;

    Ok(CompiledScript {
        scene: SceneDescription {
            operations: recorded.operations,
            result: Some(result.clone()),
        },
        result,
        warnings,
    })
}

fn pick_result(ctx: &HashMapContext, rec: &Recorder, warnings: &mut Vec<String>) -> Result<String, ScriptError> {
    for name in RESULT_VARIABLES {
        if let Some(value) = ctx.get_value(name) {
            return match value {
                Value::String(s) if rec.is_handle(s) => Ok(s.clone()),
                _ => Err(ScriptError::NotASolid(name.to_string())),
            };
        }
    }

    let mut variables: Vec<(String, Value)> = ctx
        .iter_variables()
        .filter(|(name, _)| !CONSTANTS.contains(&name.as_str()))
        .collect();
    variables.sort_by(|a, b| a.0.cmp(&b.0));

    let found = variables.iter().find_map(|(name, value)| match value {
        Value::String(s) if rec.is_handle(s) => Some((name.clone(), s.clone())),
        _ => None,
    });
    match found {
        Some((name, handle)) => {
            let warning = format!("No 'model' variable found, using '{}' instead", name);
            tracing::warn!("{}", warning);
            warnings.push(warning);
            Ok(handle)
        }
        None => Err(ScriptError::NoResult(variables.into_iter().map(|(name, _)| name).collect())),
    }
}

/// Upper bound on the evaluator's tree depth for `source`.
///
/// Brackets, unary operators, function application and chains of binary
/// operators all nest; `;` and `,` sequences are flattened by the parser.
/// Strings and comments are skipped.
fn expression_depth(source: &str) -> usize {
    // operators seen since the last separator, per open bracket
    let mut levels: Vec<usize> = vec![0];
    let mut total = 1;
    let mut deepest = total;
    let mut in_word = false;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        let word_char = c.is_alphanumeric() || matches!(c, '_' | '.' | ':');
        let starts_word = word_char && !in_word;
        in_word = word_char;

        match c {
            '"' => {
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            chars.next();
                        }
                        '"' => break,
                        _ => {}
                    }
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        break;
                    }
                }
            }
            '(' | '[' | '{' => {
                levels.push(0);
                total += 1;
            }
            ')' | ']' | '}' => {
                if levels.len() > 1 {
                    total -= levels.pop().unwrap_or(0) + 1;
                }
            }
            ';' | ',' => {
                if let Some(top) = levels.last_mut() {
                    total -= *top;
                    *top = 0;
                }
            }
            '+' | '-' | '*' | '/' | '%' | '^' | '!' | '<' | '>' | '=' | '&' | '|' => {
                if let Some(top) = levels.last_mut() {
                    *top += 1;
                    total += 1;
                }
            }
            c if starts_word && (c.is_alphabetic() || c == '_') => {
                if let Some(top) = levels.last_mut() {
                    *top += 1;
                    total += 1;
                }
            }
            _ => {}
        }
        if matches!(c, '"' | '/') {
            in_word = false;
        }
        deepest = deepest.max(total);
    }
    deepest
}

/// Compile, build and export to binary STL
pub fn run(source: &str) -> Result<ScriptRun, ScriptError> {
    let compiled = compile(source)?;
    let (stl, bounds, triangle_count) = build::build_stl(&compiled.scene)?;
    Ok(ScriptRun { compiled, stl, bounds, triangle_count })
}
