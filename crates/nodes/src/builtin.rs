//! Built-in node actions.
//!
//! These cover the stock palette of the graph editor: a start/passthrough
//! node, numeric transforms, a constant source and an output sink. Anything
//! else can be expressed with [`from_fn`].

use std::future::Future;

use async_trait::async_trait;
use serde_json::{Number, Value};
use tracing::info;

use crate::{ExecutableNode, ExecutionContext, NodeError, Payload, PayloadShape};

// ---------------------------------------------------------------------------
// Closure-backed nodes
// ---------------------------------------------------------------------------

/// Wraps an async closure as a node action.
pub struct FnNode<F> {
    f: F,
    input: PayloadShape,
    output: PayloadShape,
}

/// Build a node action from an async closure `Payload -> Result<Payload, NodeError>`.
pub fn from_fn<F, Fut>(f: F) -> FnNode<F>
where
    F: Fn(Payload) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Payload, NodeError>> + Send + 'static,
{
    FnNode {
        f,
        input: PayloadShape::Any,
        output: PayloadShape::Any,
    }
}

impl<F> FnNode<F> {
    /// Declare the shapes this closure consumes and produces.
    pub fn with_shapes(mut self, input: PayloadShape, output: PayloadShape) -> Self {
        self.input = input;
        self.output = output;
        self
    }
}

#[async_trait]
impl<F, Fut> ExecutableNode for FnNode<F>
where
    F: Fn(Payload) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Payload, NodeError>> + Send + 'static,
{
    async fn execute(&self, input: Payload, _ctx: &ExecutionContext) -> Result<Payload, NodeError> {
        (self.f)(input).await
    }

    fn input_shape(&self) -> PayloadShape {
        self.input
    }

    fn output_shape(&self) -> PayloadShape {
        self.output
    }
}

// ---------------------------------------------------------------------------
// Passthrough
// ---------------------------------------------------------------------------

/// Returns its input unchanged. Used for start nodes, whose action the
/// engine never enters.
#[derive(Debug, Default, Clone)]
pub struct Passthrough;

#[async_trait]
impl ExecutableNode for Passthrough {
    async fn execute(&self, input: Payload, _ctx: &ExecutionContext) -> Result<Payload, NodeError> {
        Ok(input)
    }
}

// ---------------------------------------------------------------------------
// Constant
// ---------------------------------------------------------------------------

/// Ignores its input and emits a fixed value.
#[derive(Debug, Clone)]
pub struct Constant {
    pub value: Value,
}

#[async_trait]
impl ExecutableNode for Constant {
    async fn execute(&self, _input: Payload, _ctx: &ExecutionContext) -> Result<Payload, NodeError> {
        Ok(self.value.clone())
    }

    fn output_shape(&self) -> PayloadShape {
        PayloadShape::of(&self.value)
    }
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
}

/// Applies `payload <op> operand` to a numeric payload.
#[derive(Debug, Clone)]
pub struct Arithmetic {
    pub op: ArithmeticOp,
    pub operand: Number,
}

impl Arithmetic {
    pub fn new(op: ArithmeticOp, operand: Number) -> Self {
        Self { op, operand }
    }

    /// Integer operands stay integers and fail on overflow; a float on
    /// either side makes the whole operation float.
    fn apply(&self, lhs: &Number) -> Result<Number, NodeError> {
        if let (Some(a), Some(b)) = (as_integer(lhs), as_integer(&self.operand)) {
            let exact = match self.op {
                ArithmeticOp::Add => a.checked_add(b),
                ArithmeticOp::Subtract => a.checked_sub(b),
                ArithmeticOp::Multiply => a.checked_mul(b),
            };
            return exact
                .and_then(|n| {
                    i64::try_from(n)
                        .map(Number::from)
                        .or_else(|_| u64::try_from(n).map(Number::from))
                        .ok()
                })
                .ok_or_else(|| {
                    NodeError::Failed(format!("{:?} of {lhs} and {} overflows", self.op, self.operand))
                });
        }

        let (a, b) = match (lhs.as_f64(), self.operand.as_f64()) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(NodeError::InvalidInput(format!("cannot do arithmetic on {lhs}"))),
        };
        let result = match self.op {
            ArithmeticOp::Add => a + b,
            ArithmeticOp::Subtract => a - b,
            ArithmeticOp::Multiply => a * b,
        };
        Number::from_f64(result)
            .ok_or_else(|| NodeError::Failed(format!("result {result} is not a finite number")))
    }
}

fn as_integer(n: &Number) -> Option<i128> {
    n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from))
}

#[async_trait]
impl ExecutableNode for Arithmetic {
    async fn execute(&self, input: Payload, _ctx: &ExecutionContext) -> Result<Payload, NodeError> {
        match &input {
            Value::Number(n) => self.apply(n).map(Value::Number),
            other => Err(NodeError::InvalidInput(format!(
                "expected a number, got {}",
                PayloadShape::of(other)
            ))),
        }
    }

    fn input_shape(&self) -> PayloadShape {
        PayloadShape::Number
    }

    fn output_shape(&self) -> PayloadShape {
        PayloadShape::Number
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Sink that reports the payload it receives and hands it back untouched.
#[derive(Debug, Default, Clone)]
pub struct Output {
    pub label: Option<String>,
}

#[async_trait]
impl ExecutableNode for Output {
    async fn execute(&self, input: Payload, ctx: &ExecutionContext) -> Result<Payload, NodeError> {
        let label = self.label.as_deref().unwrap_or(&ctx.node_id);
        info!(node = %ctx.node_id, %label, payload = %input, "output");
        Ok(input)
    }
}
