//! Capture entry points and the per-frame walk.

use std::mem::MaybeUninit;
use std::ptr;

use retrace_common::Address;

use crate::cursor::{Step, UnwindCursor};
use crate::sys;
use crate::NativeContext;

const INITIAL_TRACE_CAPACITY: usize = 16;

/// Walks the frames described by `context` and reports one address per frame.
///
/// The scratch context is advanced in place. `skip` frames are consumed
/// without being reported. `signal_initial` marks the first frame as a signal
/// frame, exempting it from the reporting-address adjustment.
fn walk(
    context: &mut NativeContext,
    mut skip: usize,
    sink: &mut dyn FnMut(Address) -> bool,
    signal_initial: bool,
) {
    let mut cursor = match UnwindCursor::from_context(context, signal_initial) {
        Some(cursor) => cursor,
        None => return,
    };

    let mut initial_frame = true;
    loop {
        let ip = match cursor.ip() {
            Some(ip) if ip != 0 => ip,
            _ => return,
        };

        if skip > 0 {
            skip -= 1;
        } else {
            // Reporting addresses point inside the calling instruction, which
            // is what line-table lookups need. A signal frame carries the
            // interrupted instruction itself and is passed through verbatim.
            let verbatim = (initial_frame && signal_initial) || cursor.is_signal_frame();
            let reporting = if verbatim { ip } else { ip - 1 };
            if sink(Address::from_native_handle(reporting)) {
                return;
            }
        }
        initial_frame = false;

        match cursor.step() {
            Step::Continue => {}
            Step::Done | Step::Failed => return,
            Step::NoUnwindInfo => {
                if !skip_leaf_frame(&mut cursor) {
                    return;
                }
            }
        }
    }
}

/// Steps past a leaf function that has no unwind info and no prologue.
///
/// The return address is still sitting on top of the stack. That stack slot
/// does not exist in the abstract machine, so the load must be volatile.
fn skip_leaf_frame(cursor: &mut UnwindCursor) -> bool {
    let sp = match cursor.sp() {
        Some(sp) if sp != 0 => sp,
        _ => return false,
    };

    let return_address = unsafe { ptr::read_volatile(sp as *const usize) };
    cursor.set_ip(return_address) && cursor.set_sp(sp + std::mem::size_of::<usize>())
}

/// Captures the context at its own (never inlined) frame and walks from there.
///
/// The extra skipped frame is this function itself, so the first reported
/// frame belongs to the caller of the public entry point.
#[inline(never)]
fn capture_current(skip: usize, sink: &mut dyn FnMut(Address) -> bool) {
    let mut context = MaybeUninit::<NativeContext>::uninit();
    if unsafe { sys::unw_getcontext(context.as_mut_ptr()) } != 0 {
        return;
    }

    let mut context = unsafe { context.assume_init() };
    walk(&mut context, skip + 1, sink, false);
}

/// Captures the current call stack, reporting each address to `sink`.
///
/// The sink returns `true` to signal "I have enough, stop". `skip` leading
/// frames are dropped before anything is reported; the capture machinery
/// itself is never reported regardless of `skip`.
#[inline(always)]
pub fn capture_with<S>(skip: usize, mut sink: S)
where
    S: FnMut(Address) -> bool,
{
    capture_current(skip, &mut sink);
}

/// Captures the current call stack into a vector.
///
/// The first entry is the address of the call to this function inside the
/// caller; the last entry belongs to the outermost frame of the thread.
///
/// # Examples
///
/// ```
/// let entries = retrace_unwind::capture(0);
/// assert!(entries.iter().all(|entry| !entry.is_null()));
/// ```
#[inline(always)]
pub fn capture(skip: usize) -> Vec<Address> {
    let mut entries = Vec::with_capacity(INITIAL_TRACE_CAPACITY);
    capture_current(skip, &mut |entry| {
        entries.push(entry);
        false
    });
    entries
}

/// Captures the current call stack into `buffer`, returning the filled
/// prefix.
///
/// An empty buffer captures nothing. Capturing stops as soon as the buffer is
/// full, regardless of the remaining stack depth.
#[inline(always)]
pub fn capture_into(buffer: &mut [Address], skip: usize) -> &mut [Address] {
    let mut filled = 0;
    if !buffer.is_empty() {
        capture_current(skip, &mut |entry| {
            buffer[filled] = entry;
            filled += 1;
            filled == buffer.len()
        });
    }
    &mut buffer[..filled]
}

/// Walks the call stack described by `context`, reporting to `sink`.
///
/// Unlike [`capture_with`], no implicit frame is skipped: the first reported
/// address is the instruction pointer contained in the context, adjusted by
/// the reporting rule.
pub fn capture_from_context_with<S>(context: &NativeContext, skip: usize, mut sink: S)
where
    S: FnMut(Address) -> bool,
{
    let mut scratch = *context;
    walk(&mut scratch, skip, &mut sink, false);
}

/// Walks the call stack described by `context` into a vector.
pub fn capture_from_context(context: &NativeContext, skip: usize) -> Vec<Address> {
    let mut entries = Vec::with_capacity(INITIAL_TRACE_CAPACITY);
    capture_from_context_with(context, skip, |entry| {
        entries.push(entry);
        false
    });
    entries
}

/// Walks the call stack described by `context` into `buffer`, returning the
/// filled prefix.
pub fn capture_from_context_into<'b>(
    context: &NativeContext,
    buffer: &'b mut [Address],
    skip: usize,
) -> &'b mut [Address] {
    let mut filled = 0;
    if !buffer.is_empty() {
        capture_from_context_with(context, skip, |entry| {
            buffer[filled] = entry;
            filled += 1;
            filled == buffer.len()
        });
    }
    &mut buffer[..filled]
}

/// Like [`capture_from_context_with`], but clobbers the caller's context
/// instead of taking a scratch copy.
pub fn capture_from_mutable_context_with<S>(context: &mut NativeContext, skip: usize, mut sink: S)
where
    S: FnMut(Address) -> bool,
{
    walk(context, skip, &mut sink, false);
}

/// Like [`capture_from_context`], but clobbers the caller's context instead
/// of taking a scratch copy.
pub fn capture_from_mutable_context(context: &mut NativeContext, skip: usize) -> Vec<Address> {
    let mut entries = Vec::with_capacity(INITIAL_TRACE_CAPACITY);
    capture_from_mutable_context_with(context, skip, |entry| {
        entries.push(entry);
        false
    });
    entries
}

/// Walks the call stack of a context delivered to a signal handler.
///
/// The first reported address is the interrupted (faulting) instruction,
/// verbatim, with no reporting-address adjustment.
pub fn capture_from_signal_context_with<S>(context: &NativeContext, skip: usize, mut sink: S)
where
    S: FnMut(Address) -> bool,
{
    let mut scratch = *context;
    walk(&mut scratch, skip, &mut sink, true);
}

/// Walks the call stack of a context delivered to a signal handler into a
/// vector.
pub fn capture_from_signal_context(context: &NativeContext, skip: usize) -> Vec<Address> {
    let mut entries = Vec::with_capacity(INITIAL_TRACE_CAPACITY);
    capture_from_signal_context_with(context, skip, |entry| {
        entries.push(entry);
        false
    });
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[inline(never)]
    fn innermost() -> Vec<Address> {
        capture(0)
    }

    #[inline(never)]
    fn middle() -> Vec<Address> {
        innermost()
    }

    #[inline(never)]
    fn outermost() -> Vec<Address> {
        middle()
    }

    #[test]
    fn test_capture_depth() {
        let entries = outermost();
        assert!(entries.len() >= 3, "got only {} frames", entries.len());
    }

    #[test]
    fn test_capture_entries_non_null() {
        let entries = capture(0);
        assert!(!entries.is_empty());
        assert!(entries.iter().all(|entry| !entry.is_null()));
    }

    #[inline(never)]
    fn capture_pair() -> (Vec<Address>, Vec<Address>) {
        (capture(0), capture(1))
    }

    #[test]
    fn test_capture_skip_drops_prefix() {
        let (full, skipped) = capture_pair();
        assert_eq!(full.len() - 1, skipped.len());

        // Frame 0 of the full trace lies inside `capture_pair`; with skip=1
        // that frame is dropped and the identical ancestry remains.
        assert_eq!(full[1..], skipped[..]);
    }

    #[test]
    fn test_capture_skip_beyond_depth() {
        let entries = capture(10_000);
        assert!(entries.is_empty());
    }

    #[test]
    fn test_capture_into_empty_buffer() {
        let mut buffer = [Address::NULL; 0];
        let filled = capture_into(&mut buffer, 0);
        assert!(filled.is_empty());
    }

    #[test]
    fn test_capture_into_single_entry() {
        let mut buffer = [Address::NULL; 1];
        let filled = capture_into(&mut buffer, 0);
        assert_eq!(filled.len(), 1);
        assert!(!filled[0].is_null());
    }

    #[test]
    fn test_capture_sink_stops_early() {
        let mut count = 0;
        capture_with(0, |_| {
            count += 1;
            count == 2
        });
        assert_eq!(count, 2);
    }

    #[test]
    fn test_skip_leaf_frame_reads_top_of_stack() {
        let mut context = MaybeUninit::<NativeContext>::uninit();
        assert_eq!(unsafe { libc::getcontext(context.as_mut_ptr()) }, 0);
        let mut context = unsafe { context.assume_init() };

        let mut cursor = UnwindCursor::from_context(&mut context, false).unwrap();

        // Fake the stack of a leaf function: the return address is still
        // sitting in the top slot, right where its caller's call left it.
        let return_address = test_skip_leaf_frame_reads_top_of_stack as usize;
        let stack = [return_address, 0xdead_beef_usize];
        assert!(cursor.set_sp(stack.as_ptr() as usize));

        assert!(skip_leaf_frame(&mut cursor));

        // The cursor now sits in the caller: the instruction pointer holds
        // the popped return address (which the walk loop then reports with
        // its usual one-byte adjustment) and the stack pointer has advanced
        // past the slot.
        assert_eq!(cursor.ip(), Some(return_address));
        assert_eq!(
            cursor.sp(),
            Some(stack.as_ptr() as usize + std::mem::size_of::<usize>())
        );
    }

    #[test]
    fn test_skip_leaf_frame_with_null_return_address() {
        let mut context = MaybeUninit::<NativeContext>::uninit();
        assert_eq!(unsafe { libc::getcontext(context.as_mut_ptr()) }, 0);
        let mut context = unsafe { context.assume_init() };

        let mut cursor = UnwindCursor::from_context(&mut context, false).unwrap();

        let stack = [0usize];
        assert!(cursor.set_sp(stack.as_ptr() as usize));

        // A zero return address is left for the walk loop to observe as the
        // end of the stack.
        assert!(skip_leaf_frame(&mut cursor));
        assert_eq!(cursor.ip(), Some(0));
    }

    #[test]
    fn test_capture_from_context() {
        let mut context = MaybeUninit::<NativeContext>::uninit();
        assert_eq!(unsafe { libc::getcontext(context.as_mut_ptr()) }, 0);
        let context = unsafe { context.assume_init() };

        let entries = capture_from_context(&context, 0);
        assert!(!entries.is_empty());
        assert!(entries.iter().all(|entry| !entry.is_null()));
    }

    #[test]
    fn test_capture_from_mutable_context_matches_copying() {
        let mut context = MaybeUninit::<NativeContext>::uninit();
        assert_eq!(unsafe { libc::getcontext(context.as_mut_ptr()) }, 0);
        let mut context = unsafe { context.assume_init() };

        let copied = capture_from_context(&context, 0);
        let clobbered = capture_from_mutable_context(&mut context, 0);
        assert_eq!(copied, clobbered);
    }
}
