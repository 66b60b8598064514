//! ARMv7-M (Cortex-M3/M4) implementation.
//!
//! Threads run in privileged thread mode on the main stack. The SysTick
//! interrupt drives `Kernel::tick`; every context switch goes through PendSV,
//! which runs at the lowest priority so it only fires once no other handler
//! is active. Threads must not use the FPU: the switch handler always returns
//! with the basic (non-FP) exception frame.

use super::{Arch, IrqState};
use core::arch::{asm, global_asm};
use core::ptr::{read_volatile, write_volatile};
use core::sync::atomic::{compiler_fence, Ordering};

// System control block
const ICSR: usize = 0xE000_ED04;
const SHPR3: usize = 0xE000_ED20;
const ICSR_PENDSVSET: u32 = 1 << 28;

// SysTick
const SYST_CSR: usize = 0xE000_E010;
const SYST_RVR: usize = 0xE000_E014;
const SYST_CVR: usize = 0xE000_E018;
const SYST_CSR_ENABLE: u32 = 1 << 0;
const SYST_CSR_TICKINT: u32 = 1 << 1;
const SYST_CSR_CLKSOURCE: u32 = 1 << 2;
const SYST_RVR_MAX: u32 = 0x00FF_FFFF;

// Handler priorities: SysTick above PendSV, PendSV last
const SYSTICK_PRIORITY: u32 = 0xC0;
const PENDSV_PRIORITY: u32 = 0xFF;

/// Cortex-M architecture implementation.
#[derive(Debug, Default)]
pub struct CortexM;

impl CortexM {
    pub const fn new() -> Self {
        Self
    }
}

impl Arch for CortexM {
    fn disable_interrupts(&self) -> IrqState {
        let primask: u32;
        unsafe {
            asm!(
                "mrs {}, PRIMASK",
                out(reg) primask,
                options(nomem, nostack, preserves_flags)
            );
            asm!("cpsid i", options(nomem, nostack, preserves_flags));
        }
        compiler_fence(Ordering::SeqCst);
        IrqState::from_enabled(primask & 1 == 0)
    }

    fn restore_interrupts(&self, state: IrqState) {
        compiler_fence(Ordering::SeqCst);
        if state.was_enabled() {
            unsafe {
                asm!("cpsie i", options(nomem, nostack, preserves_flags));
            }
        }
    }

    fn interrupts_enabled(&self) -> bool {
        let primask: u32;
        unsafe {
            asm!(
                "mrs {}, PRIMASK",
                out(reg) primask,
                options(nomem, nostack, preserves_flags)
            );
        }
        primask & 1 == 0
    }

    fn request_switch(&self) {
        unsafe {
            write_volatile(ICSR as *mut u32, ICSR_PENDSVSET);
            asm!("dsb", "isb", options(nostack, preserves_flags));
        }
    }

    fn start_tick_source(&self, reload: u32) -> Result<(), &'static str> {
        if reload == 0 || reload - 1 > SYST_RVR_MAX {
            return Err("SysTick reload out of range");
        }

        unsafe {
            // Disable while configuring
            write_volatile(SYST_CSR as *mut u32, 0);

            let shpr3 = read_volatile(SHPR3 as *const u32);
            let shpr3 = (shpr3 & 0x0000_FFFF) | (SYSTICK_PRIORITY << 24) | (PENDSV_PRIORITY << 16);
            write_volatile(SHPR3 as *mut u32, shpr3);

            write_volatile(SYST_RVR as *mut u32, reload - 1);
            // Any write clears the current value
            write_volatile(SYST_CVR as *mut u32, 0);
            write_volatile(
                SYST_CSR as *mut u32,
                SYST_CSR_ENABLE | SYST_CSR_TICKINT | SYST_CSR_CLKSOURCE,
            );
        }

        Ok(())
    }

    unsafe fn start_first_thread(&self, sp: usize) -> ! {
        unsafe {
            asm!(
                "mov sp, {sp}",
                "pop {{r4-r11}}",
                "pop {{r0-r3}}",
                "pop {{r12}}",
                // Discard the stacked LR
                "add sp, sp, #4",
                // Entry address, with the Thumb bit restored for `bx`
                "pop {{lr}}",
                "orr lr, lr, #1",
                // Discard xPSR
                "add sp, sp, #4",
                "cpsie i",
                "bx lr",
                sp = in(reg) sp,
                options(noreturn)
            );
        }
    }
}

// PendSV: save r4-r11 of the outgoing thread on its stack, let the kernel
// pick the next thread, resume it from its stack. r4 carries EXC_RETURN
// across the call; it is reloaded from the incoming frame afterwards.
global_asm!(
    ".section .text.PendSV,\"ax\",%progbits",
    ".global PendSV",
    ".type PendSV,%function",
    ".thumb_func",
    "PendSV:",
    "    cpsid i",
    "    push {{r4-r11}}",
    "    mov r0, sp",
    "    mov r4, lr",
    "    bl rr_kernel_switch_context",
    "    mov lr, r4",
    "    mov sp, r0",
    "    pop {{r4-r11}}",
    "    cpsie i",
    "    bx lr",
    ".size PendSV, . - PendSV",
);

/// Called from the PendSV handler with the outgoing thread's stack pointer.
#[no_mangle]
extern "C" fn rr_kernel_switch_context(sp: usize) -> usize {
    match crate::kernel::global_dispatch() {
        Some(kernel) => kernel.switch_context(sp),
        None => sp,
    }
}

/// SysTick exception handler.
#[allow(non_snake_case)]
#[no_mangle]
extern "C" fn SysTick() {
    if let Some(kernel) = crate::kernel::global_dispatch() {
        kernel.tick();
    }
}
