use respeak_vad::{EnergyCalculator, GateConfig, VoiceActivityGate};

fn frame_with_rms(target_rms: f32, len: usize) -> Vec<i16> {
    // A DC frame of amplitude a has RMS a/32768.
    let amplitude = (target_rms * 32768.0).round() as i16;
    vec![amplitude; len]
}

#[test]
fn frame_at_or_above_threshold_is_speech_for_any_threshold() {
    for threshold in [0.001f32, 0.003, 0.01, 0.1, 0.5] {
        let mut gate = VoiceActivityGate::new(&GateConfig {
            enabled: true,
            threshold,
            hangover_frames: 4,
        });
        let frame = frame_with_rms(threshold * 1.5, 1024);
        assert!(
            gate.classify(&frame).is_speech,
            "threshold {} misclassified a loud frame",
            threshold
        );
    }
}

#[test]
fn silence_after_full_hangover_run_of_quiet_frames() {
    for threshold in [0.003f32, 0.01, 0.1] {
        let hangover = 6;
        let mut gate = VoiceActivityGate::new(&GateConfig {
            enabled: true,
            threshold,
            hangover_frames: hangover,
        });

        let loud = frame_with_rms(threshold * 2.0, 1024);
        let quiet = frame_with_rms(threshold * 0.1, 1024);

        assert!(gate.classify(&loud).is_speech);
        for _ in 0..hangover {
            assert!(gate.classify(&quiet).is_speech);
        }
        // Immediately after a hangover-long run of quiet frames.
        assert!(!gate.classify(&quiet).is_speech);
    }
}

#[test]
fn hysteresis_bridges_a_single_quiet_frame() {
    let mut gate = VoiceActivityGate::new(&GateConfig {
        enabled: true,
        threshold: 0.01,
        hangover_frames: 1,
    });
    let loud = frame_with_rms(0.05, 1024);
    let quiet = frame_with_rms(0.001, 1024);

    assert!(gate.classify(&loud).is_speech);
    assert!(gate.classify(&quiet).is_speech);
    assert!(gate.classify(&loud).is_speech);
}

#[test]
fn synthetic_frames_hit_requested_rms() {
    let calc = EnergyCalculator::new();
    for target in [0.003f32, 0.05, 0.3] {
        let frame = frame_with_rms(target, 1024);
        let rms = calc.calculate_rms(&frame);
        assert!((rms - target).abs() < 0.001);
    }
}
