mod common;

use common::{CpuEvent, RecordingCpu};
use marquee_core::cpu::LineState;
use marquee_core::device::interrupt::{InterruptArbiter, InterruptSource, PriorityEntry};
use marquee_core::device::sound_bridge::{
    AckRule, SoundBridge, SoundBridgeConfig, STATUS_COMMAND_PENDING, STATUS_RESPONSE_PENDING,
};

fn setup(ack_rule: AckRule) -> (SoundBridge, InterruptArbiter) {
    let bridge = SoundBridge::new(SoundBridgeConfig {
        ack_rule,
        irq_divisor: 32,
    })
    .unwrap();
    let arbiter = InterruptArbiter::new(&[
        PriorityEntry::new(InterruptSource::Sound, 6),
        PriorityEntry::new(InterruptSource::Scanline, 4),
    ])
    .unwrap();
    (bridge, arbiter)
}

// ==========================================================================
// Command / response round trip
// ==========================================================================

#[test]
fn test_command_0x42_round_trip_ack_on_read() {
    let (mut sb, mut main) = setup(AckRule::OnRead);
    let mut audio = RecordingCpu::new();

    sb.main_to_sound_write(0x42, &mut audio);
    assert!(audio.nmi);
    assert_eq!(sb.status() & STATUS_COMMAND_PENDING, STATUS_COMMAND_PENDING);

    assert_eq!(sb.sound_read_command(&mut audio), 0x42);
    assert!(!audio.nmi);
    assert!(!sb.command_pending());

    sb.sound_to_main_write(0x24, &mut main);
    assert_eq!(sb.status(), STATUS_RESPONSE_PENDING);
    assert_eq!(main.recompute(), 6);

    assert_eq!(sb.main_read_response(&mut main), 0x24);
    assert_eq!(sb.status(), 0);
    assert_eq!(main.recompute(), 0);
}

#[test]
fn test_command_0x42_round_trip_ack_on_write() {
    let (mut sb, mut main) = setup(AckRule::OnWrite);
    let mut audio = RecordingCpu::new();

    sb.main_to_sound_write(0x42, &mut audio);
    assert_eq!(sb.sound_read_command(&mut audio), 0x42);
    // Reading does not acknowledge under this rule.
    assert!(sb.command_pending());
    assert!(!audio.nmi);

    sb.sound_acknowledge();
    assert!(!sb.command_pending());

    sb.main_to_sound_write(0x42, &mut audio);
    sb.sound_read_command(&mut audio);
    // A response acknowledges as well.
    sb.sound_to_main_write(0x01, &mut main);
    assert!(!sb.command_pending());
    assert!(sb.response_pending());
}

#[test]
fn test_upper_and_lower_lane_response_reads() {
    let (mut sb, mut main) = setup(AckRule::OnRead);
    sb.sound_to_main_write(0x5A, &mut main);
    assert_eq!(sb.main_read_response_word(&mut main, false), 0xFF5A);
    sb.sound_to_main_write(0x5A, &mut main);
    assert_eq!(sb.main_read_response_word(&mut main, true), 0x5AFF);
}

#[test]
fn test_main_irq_delivered_through_arbiter() {
    let (mut sb, mut main) = setup(AckRule::OnRead);
    let mut main_cpu = RecordingCpu::new();
    main.assert(InterruptSource::Scanline);
    main.deliver(&mut main_cpu);
    sb.sound_to_main_write(0x10, &mut main);
    main.deliver(&mut main_cpu);
    sb.main_read_response(&mut main);
    main.deliver(&mut main_cpu);
    assert_eq!(
        main_cpu.take_events(),
        vec![
            CpuEvent::Irq(4, LineState::Assert),
            CpuEvent::Irq(4, LineState::Clear),
            CpuEvent::Irq(6, LineState::Assert),
            CpuEvent::Irq(6, LineState::Clear),
            CpuEvent::Irq(4, LineState::Assert),
        ]
    );
}

// ==========================================================================
// Reset and IRQ
// ==========================================================================

#[test]
fn test_reset_release_reinitialises_response_side() {
    let (mut sb, mut main) = setup(AckRule::OnRead);
    let mut audio = RecordingCpu::new();
    sb.sound_to_main_write(0x77, &mut main);
    sb.reset_line(true, &mut audio, &mut main);
    assert!(sb.is_held_in_reset());
    sb.reset_line(false, &mut audio, &mut main);
    assert!(!sb.response_pending());
    assert!(!main.is_asserted(InterruptSource::Sound));
    assert_eq!(
        audio.take_events(),
        vec![
            CpuEvent::Halt(LineState::Assert),
            CpuEvent::Halt(LineState::Clear),
            CpuEvent::Reset,
        ]
    );
}

#[test]
fn test_timed_irq_every_divisor_scanlines() {
    let (mut sb, _) = setup(AckRule::OnRead);
    let mut audio = RecordingCpu::new();
    let mut fired = 0;
    for line in 0..262u16 {
        sb.on_scanline(line, &mut audio);
        if audio.irq_level != 0 {
            fired += 1;
            sb.irq_acknowledge(&mut audio);
        }
    }
    // Lines 0, 32, ..., 256.
    assert_eq!(fired, 9);
}
