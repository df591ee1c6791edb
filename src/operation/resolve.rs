//! Classification of operations into one driving contract.
//!
//! Precedence, first match wins:
//!
//! 1. absent
//! 2. iterator
//! 3. resolution
//! 4. future
//! 5. promise
//! 6. resource
//!
//! Function operations are evaluated first (with the owning task) and
//! whatever they return is classified by the same table. A dynamic operand
//! that satisfies none of the contracts is a classification error, raised
//! here and therefore only once the owning task runs.

use crate::error::{Error, Result};
use crate::runtime::task::Task;

use super::{Contracts, Coroutine, LocalFuture, Operand, OperationKind, Resolution, Resource, Thenable};

use tracing::trace;

/// The canonical form of an operation, ready to be driven.
pub(crate) enum Resolved {
    Absent,
    Iterator(Box<dyn Coroutine>),
    Resolution(Box<dyn Resolution>),
    Future(LocalFuture),
    Promise(Box<dyn Thenable>),
    Resource(Box<dyn Resource>),
}

impl Resolved {
    pub(crate) fn shape(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Iterator(_) => "iterator",
            Self::Resolution(_) => "resolution",
            Self::Future(_) => "future",
            Self::Promise(_) => "promise",
            Self::Resource(_) => "resource",
        }
    }
}

/// Resolves `kind` for the task `owner`.
pub(crate) fn resolve(kind: OperationKind, owner: &Task) -> Result<Resolved> {
    let mut kind = kind;

    // The owner's labels were fixed at spawn; only the shape is kept.
    while let OperationKind::Function(f) = kind {
        kind = f(owner).into_parts().1;
    }

    let resolved = match kind {
        OperationKind::Absent => Resolved::Absent,
        OperationKind::Iterator(body) => Resolved::Iterator(body),
        OperationKind::Resolution(resolution) => Resolved::Resolution(resolution),
        OperationKind::Future(future) => Resolved::Future(future),
        OperationKind::Promise(promise) => Resolved::Promise(promise),
        OperationKind::Resource(resource) => Resolved::Resource(resource),
        OperationKind::Dynamic(operand) => classify(operand)?,
        OperationKind::Function(_) => unreachable!("function operations are evaluated above"),
    };

    trace!(task = %owner.id(), shape = resolved.shape(), "operation resolved");
    Ok(resolved)
}

/// Picks one contract of a duck-typed operand by precedence.
pub(crate) fn classify(operand: Box<dyn Operand>) -> Result<Resolved> {
    let shape = operand.describe();
    let Contracts {
        absent,
        iterator,
        resolution,
        future,
        promise,
        resource,
    } = operand.contracts();

    if absent {
        return Ok(Resolved::Absent);
    }
    if let Some(body) = iterator {
        return Ok(Resolved::Iterator(body));
    }
    if let Some(resolution) = resolution {
        return Ok(Resolved::Resolution(resolution));
    }
    if let Some(future) = future {
        return Ok(Resolved::Future(future));
    }
    if let Some(promise) = promise {
        return Ok(Resolved::Promise(promise));
    }
    if let Some(resource) = resource {
        return Ok(Resolved::Resource(resource));
    }

    Err(Error::Classification { shape })
}
