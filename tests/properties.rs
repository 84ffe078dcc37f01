//! Property tests for ramp stepping, frame authentication and sequence freshness.

use proptest::prelude::*;

use tank_link_runtime::messages::Command;
use tank_link_runtime::motor::{step_toward, RampController, SimulatedMotors, MAX_COMMAND};
use tank_link_runtime::protocol::session::is_forward_progress;
use tank_link_runtime::protocol::{
    CodecError, ControlFrame, FrameCodec, FrameKey, RxSession, FRAME_SIZE,
};

fn command_strategy() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::Stop),
        Just(Command::Forward),
        Just(Command::Backward),
        Just(Command::Left),
        Just(Command::Right),
        Just(Command::SetSpeed),
    ]
}

fn frame_strategy() -> impl Strategy<Value = ControlFrame> {
    (command_strategy(), any::<u8>(), any::<u8>(), any::<u32>())
        .prop_map(|(cmd, left, right, seq)| ControlFrame::new(cmd, left, right, seq))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_step_converges_without_overshoot(
        start in -MAX_COMMAND..=MAX_COMMAND,
        target in -MAX_COMMAND..=MAX_COMMAND,
        step in 1u8..=255,
    ) {
        let mut current = start;
        let mut passed_zero = start == 0;
        for _ in 0..1024 {
            if current == target {
                break;
            }
            let next = step_toward(current, target, step);
            prop_assert!((i32::from(next) - i32::from(current)).abs() <= i32::from(step));
            // Never jumps across zero in a single step
            prop_assert!(!(current > 0 && next < 0) && !(current < 0 && next > 0));
            if next == 0 {
                passed_zero = true;
            }
            current = next;
        }
        prop_assert_eq!(current, target);
        if (start > 0 && target < 0) || (start < 0 && target > 0) {
            prop_assert!(passed_zero, "reversal must pass through zero");
        }
    }

    #[test]
    fn prop_tick_is_idle_inside_interval(
        interval_ms in 2u16..200,
        offset in 1u64..200,
        speed in 1u8..=255,
    ) {
        let mut ramp = RampController::with_ramp(SimulatedMotors::new(), 10, interval_ms);
        ramp.set_speed(speed, speed);
        ramp.forward();
        prop_assert!(ramp.tick(1000));
        let after_first = ramp.current();

        let early = 1000 + offset.min(u64::from(interval_ms) - 1);
        prop_assert!(!ramp.tick(early));
        prop_assert_eq!(ramp.current(), after_first);
    }

    #[test]
    fn prop_codec_round_trip(frame in frame_strategy(), key in any::<[u8; 32]>()) {
        let codec = FrameCodec::new(&FrameKey::new(key));
        let wire = codec.encode(&frame).expect("encode");
        prop_assert_eq!(wire.len(), FRAME_SIZE);
        prop_assert_eq!(codec.decode_frame(&wire).expect("decode"), frame);
    }

    #[test]
    fn prop_any_bit_flip_is_rejected(
        frame in frame_strategy(),
        byte in 0usize..FRAME_SIZE,
        bit in 0u8..8,
    ) {
        let codec = FrameCodec::new(&FrameKey::new([0x42; 32]));
        let mut wire = codec.encode(&frame).expect("encode");
        wire.as_bytes_mut()[byte] ^= 1 << bit;
        prop_assert_eq!(codec.decode_frame(&wire), Err(CodecError::Authentication));
    }

    #[test]
    fn prop_wrong_key_is_rejected(frame in frame_strategy(), a in any::<[u8; 32]>(), b in any::<[u8; 32]>()) {
        prop_assume!(a != b);
        let wire = FrameCodec::new(&FrameKey::new(a)).encode(&frame).expect("encode");
        prop_assert_eq!(
            FrameCodec::new(&FrameKey::new(b)).decode_frame(&wire),
            Err(CodecError::Authentication)
        );
    }

    #[test]
    fn prop_next_sequence_accepted_previous_rejected(last in any::<u32>()) {
        let mut session = RxSession::new();
        prop_assert!(session.accept(last, 0).is_ok());
        prop_assert!(session.accept(last, 1).is_err());
        prop_assert!(session.accept(last.wrapping_sub(1), 2).is_err());
        prop_assert!(session.accept(last.wrapping_add(1), 3).is_ok());
        prop_assert_eq!(session.last_accepted(), Some(last.wrapping_add(1)));
    }

    #[test]
    fn prop_forward_progress_is_antisymmetric(a in any::<u32>(), b in any::<u32>()) {
        prop_assume!(a != b && b.wrapping_sub(a) != 1 << 31);
        prop_assert_ne!(is_forward_progress(a, b), is_forward_progress(b, a));
    }
}

#[test]
fn test_sequence_wraps_past_max() {
    let mut session = RxSession::new();
    assert!(session.accept(u32::MAX, 0).is_ok());
    assert!(session.accept(0, 1).is_ok());
    assert!(session.accept(u32::MAX, 2).is_err());
}
