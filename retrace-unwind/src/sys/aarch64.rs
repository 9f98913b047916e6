//! libunwind bindings for aarch64.

pub type UnwContext = libc::ucontext_t;

pub type UnwWord = u64;

/// Opaque cursor structure, sized per `UNW_TDEP_CURSOR_LEN`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct UnwCursor {
    pub opaque: [UnwWord; 4096],
}

#[link(name = "unwind")]
extern "C" {
    #[link_name = "_Uaarch64_getcontext"]
    pub fn unw_getcontext(context: *mut UnwContext) -> i32;
    #[link_name = "_ULaarch64_init_local2"]
    pub fn unw_init_local2(cursor: *mut UnwCursor, context: *mut UnwContext, flag: i32) -> i32;
    #[link_name = "_ULaarch64_step"]
    pub fn unw_step(cursor: *mut UnwCursor) -> i32;
    #[link_name = "_ULaarch64_get_reg"]
    pub fn unw_get_reg(cursor: *mut UnwCursor, reg: i32, valp: *mut UnwWord) -> i32;
    #[link_name = "_ULaarch64_set_reg"]
    pub fn unw_set_reg(cursor: *mut UnwCursor, reg: i32, val: UnwWord) -> i32;
    #[link_name = "_ULaarch64_is_signal_frame"]
    pub fn unw_is_signal_frame(cursor: *mut UnwCursor) -> i32;
}

pub const UNW_REG_IP: i32 = 32;
pub const UNW_REG_SP: i32 = 31;
