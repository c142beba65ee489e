//! Bookkeeping of which patches a page carries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::InterceptError;
use web_platform::GlobalScope;

#[derive(Debug, Clone, Copy)]
pub(crate) enum PatchSlot {
    Fetch,
    Xhr,
}

impl PatchSlot {
    pub(crate) fn name(self) -> &'static str {
        match self {
            PatchSlot::Fetch => "fetch",
            PatchSlot::Xhr => "XMLHttpRequest",
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Patches {
    fetch: AtomicBool,
    xhr: AtomicBool,
}

impl Patches {
    pub(crate) fn for_scope(scope: &GlobalScope) -> Arc<Patches> {
        scope.singleton(Patches::default)
    }

    fn flag(&self, slot: PatchSlot) -> &AtomicBool {
        match slot {
            PatchSlot::Fetch => &self.fetch,
            PatchSlot::Xhr => &self.xhr,
        }
    }

    pub(crate) fn claim(&self, slot: PatchSlot) -> Result<(), InterceptError> {
        if self.flag(slot).swap(true, Ordering::SeqCst) {
            return Err(InterceptError::AlreadyInstalled(slot.name()));
        }
        Ok(())
    }

    pub(crate) fn release(&self, slot: PatchSlot) {
        self.flag(slot).store(false, Ordering::SeqCst);
    }
}

/// Whether two trait objects are the same allocation
pub(crate) fn same_object<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
