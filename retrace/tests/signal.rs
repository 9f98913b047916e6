//! Capturing from a signal-delivered context.

use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use retrace::{Address, NativeContext};

const MAX_CAPACITY: usize = 64;

static CAPTURED: AtomicUsize = AtomicUsize::new(0);
static mut ENTRIES: [Address; MAX_CAPACITY] = [Address::NULL; MAX_CAPACITY];

unsafe extern "C" fn on_signal(
    _signo: libc::c_int,
    _info: *mut libc::siginfo_t,
    context: *mut libc::c_void,
) {
    let context = &*(context as *const NativeContext);
    let entries = ptr::addr_of_mut!(ENTRIES);

    let mut filled = 0;
    retrace::capture_from_signal_context_with(context, 0, |entry| {
        unsafe { (*entries)[filled] = entry };
        filled += 1;
        filled == MAX_CAPACITY
    });

    CAPTURED.store(filled, Ordering::SeqCst);
}

#[test]
fn test_capture_from_signal_context() {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_signal as usize;
        action.sa_flags = libc::SA_SIGINFO;

        let mut previous: libc::sigaction = std::mem::zeroed();
        assert_eq!(libc::sigaction(libc::SIGUSR1, &action, &mut previous), 0);

        assert_eq!(libc::raise(libc::SIGUSR1), 0);

        libc::sigaction(libc::SIGUSR1, &previous, ptr::null_mut());
    }

    let count = CAPTURED.load(Ordering::SeqCst);
    assert!(count > 0, "nothing captured from the signal context");

    let entries = unsafe { ptr::addr_of!(ENTRIES).read() };
    assert!(entries[..count].iter().all(|entry| !entry.is_null()));
}
