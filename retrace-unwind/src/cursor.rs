//! A safe wrapper around libunwind's local unwind cursor.

use std::mem::MaybeUninit;

use crate::sys;
use crate::NativeContext;

/// Outcome of advancing the cursor by one frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
    /// The cursor moved to the caller frame.
    Continue,
    /// The end of the stack was reached.
    Done,
    /// No unwind info covers the current instruction pointer.
    NoUnwindInfo,
    /// The unwind step failed and cannot make progress.
    Failed,
}

/// A cursor over the frames described by a machine context.
///
/// The cursor keeps its own register state; the context it was initialized
/// from is only read during initialization.
pub struct UnwindCursor {
    raw: sys::UnwCursor,
}

impl UnwindCursor {
    /// Initializes a cursor from a machine context.
    ///
    /// `signal_frame` declares that the context was taken from a signal
    /// delivery, in which case its instruction pointer is the interrupted
    /// instruction rather than a return address.
    pub fn from_context(context: &mut NativeContext, signal_frame: bool) -> Option<Self> {
        let flag = if signal_frame {
            sys::UNW_INIT_SIGNAL_FRAME
        } else {
            0
        };

        let mut raw = MaybeUninit::<sys::UnwCursor>::uninit();
        let result = unsafe { sys::unw_init_local2(raw.as_mut_ptr(), context, flag) };
        if result != 0 {
            return None;
        }

        Some(UnwindCursor {
            raw: unsafe { raw.assume_init() },
        })
    }

    fn register(&mut self, reg: i32) -> Option<usize> {
        let mut value = sys::UnwWord::default();
        let result = unsafe { sys::unw_get_reg(&mut self.raw, reg, &mut value) };
        (result == 0).then_some(value as usize)
    }

    fn set_register(&mut self, reg: i32, value: usize) -> bool {
        unsafe { sys::unw_set_reg(&mut self.raw, reg, value as sys::UnwWord) == 0 }
    }

    /// Reads the instruction pointer of the current frame.
    pub fn ip(&mut self) -> Option<usize> {
        self.register(sys::UNW_REG_IP)
    }

    /// Reads the stack pointer of the current frame.
    pub fn sp(&mut self) -> Option<usize> {
        self.register(sys::UNW_REG_SP)
    }

    /// Overwrites the instruction pointer of the current frame.
    pub fn set_ip(&mut self, value: usize) -> bool {
        self.set_register(sys::UNW_REG_IP, value)
    }

    /// Overwrites the stack pointer of the current frame.
    pub fn set_sp(&mut self, value: usize) -> bool {
        self.set_register(sys::UNW_REG_SP, value)
    }

    /// Returns whether the current frame is a signal frame.
    ///
    /// A non-positive result (including errors, which usually mean "no info")
    /// is reported as `false`, so return addresses get their usual one-byte
    /// adjustment.
    pub fn is_signal_frame(&mut self) -> bool {
        unsafe { sys::unw_is_signal_frame(&mut self.raw) > 0 }
    }

    /// Applies one virtual unwind step, advancing to the caller frame.
    pub fn step(&mut self) -> Step {
        let result = unsafe { sys::unw_step(&mut self.raw) };
        if result > 0 {
            Step::Continue
        } else if result == 0 {
            Step::Done
        } else if result == -sys::UNW_ENOINFO {
            Step::NoUnwindInfo
        } else {
            Step::Failed
        }
    }
}
