//! Task records: the unit carried by one channel slot.

use bitflags::bitflags;

use crate::value::Value;

bitflags! {
    /// Frame flags carried in the first header word of a response slot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TaskFlags: u32 {
        /// The carried value is a rejection payload, not a result.
        const REJECT = 1;
    }
}

/// One request or response frame.
///
/// On the request side `flags_or_fn` holds the function id; on the response
/// side it holds [`TaskFlags`] bits. The remaining header fields mirror the
/// slot header words so a task can be staged before a slot is claimed and
/// written verbatim once one frees up.
#[derive(Debug)]
pub struct Task {
    pub flags_or_fn: u32,
    pub id: u32,
    /// Advisory timeout in milliseconds; zero means none.
    pub timeout_ms: u32,
    pub value: Value,
}

impl Task {
    pub fn request(fn_id: u32, call_id: u32, value: Value) -> Self {
        Self {
            flags_or_fn: fn_id,
            id: call_id,
            timeout_ms: 0,
            value,
        }
    }

    pub fn response(call_id: u32, value: Value) -> Self {
        Self {
            flags_or_fn: TaskFlags::empty().bits(),
            id: call_id,
            timeout_ms: 0,
            value,
        }
    }

    pub fn rejection(call_id: u32, reason: Value) -> Self {
        Self {
            flags_or_fn: TaskFlags::REJECT.bits(),
            id: call_id,
            timeout_ms: 0,
            value: reason,
        }
    }

    #[inline]
    pub fn is_reject(&self) -> bool {
        TaskFlags::from_bits_truncate(self.flags_or_fn).contains(TaskFlags::REJECT)
    }
}

/// Free-list of task records, bounded by channel capacity so drains never
/// allocate in steady state.
pub struct TaskPool {
    free: Vec<Task>,
}

impl TaskPool {
    pub fn new() -> Self {
        Self {
            free: Vec::with_capacity(crate::layout::SLOTS),
        }
    }

    pub fn take(&mut self) -> Task {
        self.free.pop().unwrap_or_else(|| Task {
            flags_or_fn: 0,
            id: 0,
            timeout_ms: 0,
            value: Value::Undefined,
        })
    }

    pub fn put(&mut self, mut task: Task) {
        if self.free.len() < crate::layout::SLOTS {
            task.value = Value::Undefined;
            self.free.push(task);
        }
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_flag_roundtrip() {
        let ok = Task::response(1, Value::Int(1));
        let bad = Task::rejection(2, Value::Str("nope".into()));
        assert!(!ok.is_reject());
        assert!(bad.is_reject());
    }

    #[test]
    fn pool_recycles_records() {
        let mut pool = TaskPool::new();
        let mut t = pool.take();
        t.id = 7;
        t.value = Value::Int(42);
        pool.put(t);
        let t2 = pool.take();
        // Value is scrubbed on return; header fields are overwritten by the
        // next decode anyway.
        assert_eq!(t2.value, Value::Undefined);
    }
}
