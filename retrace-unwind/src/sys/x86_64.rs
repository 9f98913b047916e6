//! libunwind bindings for x86_64.

pub type UnwContext = libc::ucontext_t;

pub type UnwWord = u64;

/// Opaque cursor structure, sized per `UNW_TDEP_CURSOR_LEN`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct UnwCursor {
    pub opaque: [UnwWord; 127],
}

#[link(name = "unwind")]
extern "C" {
    #[link_name = "_Ux86_64_getcontext"]
    pub fn unw_getcontext(context: *mut UnwContext) -> i32;
    #[link_name = "_ULx86_64_init_local2"]
    pub fn unw_init_local2(cursor: *mut UnwCursor, context: *mut UnwContext, flag: i32) -> i32;
    #[link_name = "_ULx86_64_step"]
    pub fn unw_step(cursor: *mut UnwCursor) -> i32;
    #[link_name = "_ULx86_64_get_reg"]
    pub fn unw_get_reg(cursor: *mut UnwCursor, reg: i32, valp: *mut UnwWord) -> i32;
    #[link_name = "_ULx86_64_set_reg"]
    pub fn unw_set_reg(cursor: *mut UnwCursor, reg: i32, val: UnwWord) -> i32;
    #[link_name = "_ULx86_64_is_signal_frame"]
    pub fn unw_is_signal_frame(cursor: *mut UnwCursor) -> i32;
}

// Generic register aliases resolved against the x86_64 enum: UNW_REG_IP is
// UNW_X86_64_RIP, UNW_REG_SP is UNW_X86_64_RSP (17 would be the read-only
// CFA pseudo register).
pub const UNW_REG_IP: i32 = 16;
pub const UNW_REG_SP: i32 = 7;
