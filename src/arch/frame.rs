//! Initial register frame for a thread that has never run.
//!
//! The layout matches what the switch handler pops on resume: the eight
//! callee-saved registers pushed by software, followed by the eight words the
//! Cortex-M exception entry stacks in hardware.
//!
//! ```text
//! sp ->  r4 r5 r6 r7 r8 r9 r10 r11 | r0 r1 r2 r3 r12 lr pc xpsr
//! ```

use super::StackWord;

/// Number of words in a saved frame.
pub const FRAME_WORDS: usize = 16;

/// xPSR with only the Thumb bit set: normal thread mode, no flags.
pub const XPSR_THUMB: StackWord = 0x0100_0000;

/// Word offsets of each register inside a frame.
pub mod slot {
    pub const R4: usize = 0;
    pub const R5: usize = 1;
    pub const R6: usize = 2;
    pub const R7: usize = 3;
    pub const R8: usize = 4;
    pub const R9: usize = 5;
    pub const R10: usize = 6;
    pub const R11: usize = 7;
    pub const R0: usize = 8;
    pub const R1: usize = 9;
    pub const R2: usize = 10;
    pub const R3: usize = 11;
    pub const R12: usize = 12;
    pub const LR: usize = 13;
    pub const PC: usize = 14;
    pub const XPSR: usize = 15;
}

// Register fill patterns, recognizable in a debugger.
const FILL: [(usize, StackWord); 13] = [
    (slot::R4, 0x0404_0404),
    (slot::R5, 0x0505_0505),
    (slot::R6, 0x0606_0606),
    (slot::R7, 0x0707_0707),
    (slot::R8, 0x0808_0808),
    (slot::R9, 0x0909_0909),
    (slot::R10, 0x1010_1010),
    (slot::R11, 0x1111_1111),
    (slot::R0, 0x0000_0000),
    (slot::R1, 0x0101_0101),
    (slot::R2, 0x0202_0202),
    (slot::R3, 0x0303_0303),
    (slot::R12, 0x1212_1212),
];

/// Link register value of a fresh frame. Thread entries never return.
pub const LR_FILL: StackWord = 0x1414_1414;

/// Write a fresh frame at the top of `stack` and return its address.
///
/// The stacked PC has bit 0 cleared, as exception return requires; the
/// first-thread launch sets it again before branching. Running this twice on
/// the same stack produces the same frame.
pub fn build_initial_frame(stack: &mut [StackWord], entry: usize) -> usize {
    debug_assert!(stack.len() >= FRAME_WORDS, "stack smaller than one frame");

    let base = stack.len() - FRAME_WORDS;
    let frame = &mut stack[base..];

    for (index, value) in FILL {
        frame[index] = value;
    }
    frame[slot::LR] = LR_FILL;
    frame[slot::PC] = entry & !1;
    frame[slot::XPSR] = XPSR_THUMB;

    frame.as_ptr() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    #[test]
    fn test_frame_sits_at_top_of_stack() {
        let mut stack = [0 as StackWord; 64];
        let sp = build_initial_frame(&mut stack, entry as usize);

        let expected = &stack[64 - FRAME_WORDS] as *const StackWord as usize;
        assert_eq!(sp, expected);
        // Nothing below the frame is touched
        assert!(stack[..64 - FRAME_WORDS].iter().all(|&w| w == 0));
    }

    #[test]
    fn test_frame_entry_and_mode() {
        let mut stack = [0 as StackWord; 32];
        build_initial_frame(&mut stack, entry as usize);
        let frame = &stack[32 - FRAME_WORDS..];

        assert_eq!(frame[slot::PC], (entry as usize) & !1);
        assert_eq!(frame[slot::XPSR], XPSR_THUMB);
        assert_eq!(frame[slot::LR], LR_FILL);
        assert_eq!(frame[slot::R4], 0x0404_0404);
        assert_eq!(frame[slot::R12], 0x1212_1212);
    }

    #[test]
    fn test_thumb_bit_stripped_from_pc() {
        let mut stack = [0 as StackWord; 16];
        build_initial_frame(&mut stack, 0x0800_1235);
        assert_eq!(stack[slot::PC], 0x0800_1234);
    }

    #[test]
    fn test_rebuilding_is_idempotent() {
        let mut stack = [0 as StackWord; 48];
        let first_sp = build_initial_frame(&mut stack, entry as usize);
        let first = stack;

        // Scribble over the frame, as a half-started thread would
        stack[48 - 3] = 0xdead;
        let second_sp = build_initial_frame(&mut stack, entry as usize);

        assert_eq!(first_sp, second_sp);
        assert_eq!(first, stack);
    }
}
