use cnetz_config::SharedConfig;
use cnetz_core::{BitBuffer, CnetzEntity, Sap};
use cnetz_saps::fs::FsFrameReq;
use cnetz_saps::mc::McTelegramInd;
use cnetz_saps::{SapMsg, SapMsgInner};
use cnetz_telegrams::INFO_BITS;

use crate::coder::components::blockcode::{self, DATA_BITS, WORDS_PER_TELEGRAM, WORD_BITS};
use crate::coder::components::framing::assemble_frame;
use crate::coder::components::interleave::{self, BLOCK_BITS};
use crate::{CnetzEntityTrait, MessageQueue};

#[derive(Debug, PartialEq, Eq)]
pub enum CodecErr {
    /// One of the ten code words had more than two bit errors; the whole
    /// telegram is rejected
    Uncorrectable { word: usize },
    /// All info bits identical, an idle/noise artifact
    IdleArtifact,
}

/// Expand a 70-bit info word into a complete 184-bit air frame:
/// 10 groups of 7 -> 10 code words of 15 -> column interleave -> sync prefix.
pub fn encode_telegram(sdu: &BitBuffer) -> BitBuffer {
    assert_eq!(sdu.get_len(), INFO_BITS, "info word must be {} bits", INFO_BITS);
    let info = sdu.as_bits();

    let mut words = [0u8; BLOCK_BITS];
    for w in 0..WORDS_PER_TELEGRAM {
        let mut data = 0u8;
        for b in 0..DATA_BITS {
            data = (data << 1) | info[w * DATA_BITS + b];
        }
        let word = blockcode::encode(data);
        for b in 0..WORD_BITS {
            words[w * WORD_BITS + b] = ((word >> (WORD_BITS - 1 - b)) & 1) as u8;
        }
    }

    let mut coded = [0u8; BLOCK_BITS];
    interleave::interleave(&words, &mut coded);
    assemble_frame(&coded)
}

/// Reverse the interleaving and decode each code word independently.
/// Returns the 70-bit info word plus the total number of corrected bit
/// errors across all words.
pub fn decode_telegram(coded: &BitBuffer) -> Result<(BitBuffer, u8), CodecErr> {
    assert_eq!(coded.get_len(), BLOCK_BITS, "coded block must be {} bits", BLOCK_BITS);

    let mut air = [0u8; BLOCK_BITS];
    air.copy_from_slice(coded.as_bits());
    let mut words = [0u8; BLOCK_BITS];
    interleave::deinterleave(&air, &mut words);

    let mut info = [0u8; INFO_BITS];
    let mut errors: u8 = 0;
    for w in 0..WORDS_PER_TELEGRAM {
        let mut word = 0u16;
        for b in 0..WORD_BITS {
            word = (word << 1) | words[w * WORD_BITS + b] as u16;
        }
        let (data, word_errors) =
            blockcode::decode(word).ok_or(CodecErr::Uncorrectable { word: w })?;
        errors += word_errors;
        for b in 0..DATA_BITS {
            info[w * DATA_BITS + b] = (data >> (DATA_BITS - 1 - b)) & 1;
        }
    }

    if info.iter().all(|&b| b == info[0]) {
        return Err(CodecErr::IdleArtifact);
    }

    Ok((BitBuffer::from_bitarr(&info), errors))
}

/// Telegram codec entity: translates between frame-level primitives from the
/// bit synchronizer and info-word primitives for call control.
pub struct CoderBs {
    config: SharedConfig,
}

impl CoderBs {
    pub fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn rx_fs_frame_ind(&mut self, queue: &mut MessageQueue, message: SapMsg) {
        let SapMsgInner::FsFrameInd(prim) = message.msg else { panic!() };

        let (sdu, bit_errors) = match decode_telegram(&prim.coded) {
            Ok(v) => v,
            Err(CodecErr::Uncorrectable { word }) => {
                tracing::debug!(
                    "chan {}: telegram rejected, word {} uncorrectable",
                    prim.chan_nr,
                    word
                );
                return;
            }
            Err(CodecErr::IdleArtifact) => {
                tracing::trace!("chan {}: idle artifact discarded", prim.chan_nr);
                return;
            }
        };

        tracing::trace!(
            "chan {}: <- info {} ({} bit errors)",
            prim.chan_nr,
            sdu.dump_hex(),
            bit_errors
        );

        queue.push_back(SapMsg {
            sap: Sap::McSap,
            src: CnetzEntity::Coder,
            dest: CnetzEntity::CallControl,
            time: message.time,
            msg: SapMsgInner::McTelegramInd(McTelegramInd {
                chan_nr: prim.chan_nr,
                sdu,
                bit_errors,
                level: prim.level,
                time_offset: prim.time_offset,
                jitter: prim.jitter,
                inverted: prim.inverted,
            }),
        });
    }

    fn rx_mc_telegram_req(&mut self, queue: &mut MessageQueue, message: SapMsg) {
        let SapMsgInner::McTelegramReq(prim) = message.msg else { panic!() };

        let frame = encode_telegram(&prim.sdu);
        tracing::trace!("chan {}: -> frame {}", prim.chan_nr, frame.dump_hex());

        queue.push_back(SapMsg {
            sap: Sap::FsSap,
            src: CnetzEntity::Coder,
            dest: CnetzEntity::Phy,
            time: message.time,
            msg: SapMsgInner::FsFrameReq(FsFrameReq {
                chan_nr: prim.chan_nr,
                frame,
                slot: prim.slot,
                distributed: prim.distributed,
            }),
        });
    }
}

impl CnetzEntityTrait for CoderBs {
    fn entity(&self) -> CnetzEntity {
        CnetzEntity::Coder
    }

    fn set_config(&mut self, config: SharedConfig) {
        self.config = config;
    }

    fn rx_prim(&mut self, queue: &mut MessageQueue, message: SapMsg) {
        match message.msg {
            SapMsgInner::FsFrameInd(_) => self.rx_fs_frame_ind(queue, message),
            SapMsgInner::McTelegramReq(_) => self.rx_mc_telegram_req(queue, message),
            _ => panic!("unexpected primitive for Coder: {:?}", message.msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use cnetz_core::Futln;
    use cnetz_telegrams::pdus::ChannelAssign;
    use cnetz_telegrams::Telegram;

    use super::*;
    use crate::coder::components::framing::{FRAME_BITS, SYNC_BITS};

    fn frame_payload(frame: &BitBuffer) -> BitBuffer {
        BitBuffer::from_bitarr(&frame.as_bits()[SYNC_BITS + 1..])
    }

    #[test]
    fn test_roundtrip_law() {
        let telegram = Telegram::ChannelAssign(ChannelAssign {
            futln: Futln::new(2, 17, 54321),
            chan: 287,
            combined: false,
            terminating: true,
        });
        let sdu = telegram.encode();
        let frame = encode_telegram(&sdu);
        assert_eq!(frame.get_len(), FRAME_BITS);

        let (decoded, errors) = decode_telegram(&frame_payload(&frame)).unwrap();
        assert_eq!(errors, 0);
        assert_eq!(decoded.to_bitstr(), sdu.to_bitstr());
    }

    #[test]
    fn test_random_payload_roundtrip() {
        for _ in 0..50 {
            let mut info = [0u8; INFO_BITS];
            for bit in info.iter_mut() {
                *bit = rand::random_range(0..2u8);
            }
            // avoid the idle artifact pattern
            info[0] = 1;
            info[1] = 0;
            let sdu = BitBuffer::from_bitarr(&info);
            let frame = encode_telegram(&sdu);
            let (decoded, errors) = decode_telegram(&frame_payload(&frame)).unwrap();
            assert_eq!(errors, 0);
            assert_eq!(decoded.to_bitstr(), sdu.to_bitstr());
        }
    }

    #[test]
    fn test_correctable_errors_within_one_word() {
        let telegram = Telegram::ChannelAssign(ChannelAssign {
            futln: Futln::new(1, 3, 4711),
            chan: 124,
            combined: true,
            terminating: false,
        });
        let sdu = telegram.encode();
        let frame = encode_telegram(&sdu);
        let payload = frame_payload(&frame);

        // Interleaving puts bits of code word 0 at air positions 0, 10, 20, ...
        // One flipped bit: accepted with error count 1
        let mut one = [0u8; BLOCK_BITS];
        one.copy_from_slice(payload.as_bits());
        one[0] ^= 1;
        let (decoded, errors) = decode_telegram(&BitBuffer::from_bitarr(&one)).unwrap();
        assert_eq!(errors, 1);
        assert_eq!(decoded.to_bitstr(), sdu.to_bitstr());

        // Two flipped bits in the same code word: accepted with error count 2
        let mut two = [0u8; BLOCK_BITS];
        two.copy_from_slice(payload.as_bits());
        two[0] ^= 1;
        two[10] ^= 1;
        let (decoded, errors) = decode_telegram(&BitBuffer::from_bitarr(&two)).unwrap();
        assert_eq!(errors, 2);
        assert_eq!(decoded.to_bitstr(), sdu.to_bitstr());

        // Three flipped bits in the same code word: rejected
        let mut three = [0u8; BLOCK_BITS];
        three.copy_from_slice(payload.as_bits());
        three[0] ^= 1;
        three[10] ^= 1;
        three[20] ^= 1;
        assert_eq!(
            decode_telegram(&BitBuffer::from_bitarr(&three)),
            Err(CodecErr::Uncorrectable { word: 0 })
        );
    }

    #[test]
    fn test_errors_in_different_words_accumulate() {
        let telegram = Telegram::ChannelAssign(ChannelAssign {
            futln: Futln::new(1, 3, 4711),
            chan: 124,
            combined: false,
            terminating: false,
        });
        let sdu = telegram.encode();
        let frame = encode_telegram(&sdu);
        let mut air = [0u8; BLOCK_BITS];
        air.copy_from_slice(frame_payload(&frame).as_bits());
        // air positions 0 and 1 belong to code words 0 and 1
        air[0] ^= 1;
        air[1] ^= 1;
        let (decoded, errors) = decode_telegram(&BitBuffer::from_bitarr(&air)).unwrap();
        assert_eq!(errors, 2);
        assert_eq!(decoded.to_bitstr(), sdu.to_bitstr());
    }

    #[test]
    fn test_idle_artifact_discarded() {
        for fill in [0u8, 1u8] {
            let info = [fill; INFO_BITS];
            let sdu = BitBuffer::from_bitarr(&info);
            let frame = encode_telegram(&sdu);
            assert_eq!(
                decode_telegram(&frame_payload(&frame)),
                Err(CodecErr::IdleArtifact)
            );
        }
    }
}
