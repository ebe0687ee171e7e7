//! Air-frame assembly: three repetitions of the 11-bit sync sequence, one
//! marker bit, then the 150 interleaved code bits.

use cnetz_core::BitBuffer;

use super::interleave::BLOCK_BITS;

/// The 11-bit correlation sequence (Barker-11)
pub const SYNC_SEQ: [u8; 11] = [1, 1, 1, 0, 0, 0, 1, 0, 0, 1, 0];

pub const SYNC_REPEATS: usize = 3;

/// Bits of sync pattern the receiver correlates on
pub const SYNC_BITS: usize = SYNC_SEQ.len() * SYNC_REPEATS;

/// The marker bit separating sync and payload
pub const MARKER_BIT: u8 = 1;

/// Complete on-air frame length
pub const FRAME_BITS: usize = SYNC_BITS + 1 + BLOCK_BITS;

/// The full 34-bit prefix (sync repetitions + marker) as bit values
pub fn sync_prefix() -> [u8; SYNC_BITS + 1] {
    let mut prefix = [0u8; SYNC_BITS + 1];
    for rep in 0..SYNC_REPEATS {
        prefix[rep * SYNC_SEQ.len()..(rep + 1) * SYNC_SEQ.len()].copy_from_slice(&SYNC_SEQ);
    }
    prefix[SYNC_BITS] = MARKER_BIT;
    prefix
}

/// Prefix the interleaved code bits with sync and marker
pub fn assemble_frame(coded: &[u8; BLOCK_BITS]) -> BitBuffer {
    let mut frame = BitBuffer::new(FRAME_BITS);
    frame.write_bitarr(&sync_prefix());
    frame.write_bitarr(coded);
    frame.seek(0);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        assert_eq!(FRAME_BITS, 184);
        let coded = [1u8; BLOCK_BITS];
        let frame = assemble_frame(&coded);
        assert_eq!(frame.get_len(), FRAME_BITS);
        let bits = frame.as_bits();
        assert_eq!(&bits[0..11], &SYNC_SEQ);
        assert_eq!(&bits[11..22], &SYNC_SEQ);
        assert_eq!(&bits[22..33], &SYNC_SEQ);
        assert_eq!(bits[33], MARKER_BIT);
        assert!(bits[34..].iter().all(|&b| b == 1));
    }
}
