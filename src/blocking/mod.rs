//! Synchronous facade over the async API.
//!
//! Every call parks the current thread on a shared current-thread runtime, so
//! chunks are still committed one after another. Do not call these functions
//! from inside an async context.

pub mod query;

use std::future::Future;

use once_cell::sync::OnceCell;
use tokio::runtime::{Builder, Runtime};

use crate::firestore::error::{internal_error, FirestoreResult};

static RT: OnceCell<Runtime> = OnceCell::new();

fn runtime() -> FirestoreResult<&'static Runtime> {
    RT.get_or_try_init(|| {
        Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| internal_error(format!("failed to start blocking runtime: {err}")))
    })
}

fn block_on<F, T>(fut: F) -> FirestoreResult<T>
where
    F: Future<Output = FirestoreResult<T>>,
{
    runtime()?.block_on(fut)
}

macro_rules! block_on_methods {
    ($(fn $name:ident($target:ident : $target_ty:ty $(, $arg:ident : $ty:ty)*) -> $ret:ty);* $(;)?) => {
        $(pub fn $name($target: $target_ty $(, $arg: $ty)*) -> FirestoreResult<$ret> {
            block_on($target.$name($($arg),*))
        })*
    };
}

pub(crate) use block_on_methods;
