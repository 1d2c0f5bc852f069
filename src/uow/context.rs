//! Task-local adapter for service call sites.
//!
//! The engines take the unit of work explicitly. Outer layers that would
//! rather not thread it by hand can bind one to the current tokio task with
//! [`scope`] and reach it from anywhere inside with [`with_current`].

use std::cell::RefCell;
use std::future::Future;

use super::UnitOfWork;
use crate::{Error, Result};

tokio::task_local! {
    static CURRENT: RefCell<Option<UnitOfWork>>;
}

/// Run `fut` with `uow` bound as the task's current unit of work. The unit
/// is cleared (and deregistered) when the future completes.
pub async fn scope<F>(uow: UnitOfWork, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT
        .scope(RefCell::new(Some(uow)), async move {
            let output = fut.await;
            if let Some(uow) = CURRENT.with(|cell| cell.borrow_mut().take()) {
                uow.clear();
            }
            output
        })
        .await
}

/// Borrow the current task's unit of work. `Ok(None)` outside [`scope`];
/// `IllegalState` when called again while the unit is already borrowed.
pub fn with_current<R>(f: impl FnOnce(&mut UnitOfWork) -> R) -> Result<Option<R>> {
    let Ok(result) = CURRENT.try_with(|cell| match cell.try_borrow_mut() {
        Ok(mut current) => Ok(current.as_mut().map(f)),
        Err(_) => Err(Error::IllegalState("unit of work already borrowed on this task".into())),
    }) else {
        return Ok(None);
    };
    result
}
