//! End-to-end scenarios through the assembled pipeline.

use std::f32::consts::PI;
use std::sync::Arc;
use uuid::Uuid;

use crate::alert::{
    Actor, AlertLifecycleManager, AlertReason, AlertStatus, DeviceRegistry, Role, Severity,
};
use crate::classifier::{EnsembleClassifier, ModelArtifact, StressLabel};
use crate::config::EngineConfig;
use crate::events::EngineEvent;
use crate::pipeline::{AudioClip, DistressPipeline, SensorSample};
use crate::physio::VitalsSample;

fn registry_for(device: &str) -> Arc<DeviceRegistry> {
    Arc::new(DeviceRegistry::with_device(device, Uuid::new_v4(), &[]))
}

fn pipeline(device: &str, classifier: Option<EnsembleClassifier>) -> DistressPipeline {
    let alerts = Arc::new(AlertLifecycleManager::new(registry_for(device)));
    DistressPipeline::new(EngineConfig::default(), classifier, alerts).unwrap()
}

fn quiet_vitals() -> VitalsSample {
    VitalsSample {
        heart_rate: Some(75.0),
        temperature: Some(36.5),
        spo2: Some(98.0),
    }
}

fn sample(device: &str) -> SensorSample {
    SensorSample {
        device_id: device.to_string(),
        timestamp: chrono::Utc::now(),
        vitals: VitalsSample::default(),
        gps: None,
        audio: None,
        manual_trigger: false,
    }
}

fn tone_clip(seconds: usize) -> AudioClip {
    let samples = (0..16000 * seconds)
        .map(|i| (2.0 * PI * 440.0 * i as f32 / 16000.0).sin() * 0.5)
        .collect();
    AudioClip {
        samples,
        sample_rate: 16000,
    }
}

/// Scenario A: normal vitals, no audio, no manual trigger
#[tokio::test]
async fn scenario_a_normal_vitals_no_alert() {
    let pipeline = pipeline("band-01", None);
    let mut s = sample("band-01");
    s.vitals = quiet_vitals();

    let outcome = pipeline.evaluate(s).await.unwrap();
    assert!(outcome.score.combined.abs() < 1e-9);
    assert!(!outcome.score.triggered);
    assert!(outcome.alert.is_none());
}

/// Scenario B: violated vitals plus the SOS button
#[tokio::test]
async fn scenario_b_manual_trigger_opens_sos_alert() {
    let pipeline = pipeline("band-01", None);
    let mut s = sample("band-01");
    s.vitals = VitalsSample {
        heart_rate: Some(140.0),
        temperature: Some(40.0),
        spo2: None,
    };
    s.manual_trigger = true;

    let outcome = pipeline.evaluate(s).await.unwrap();
    assert!(outcome.score.triggered);
    assert!(outcome.alert_created);

    let alert = outcome.alert.unwrap();
    assert_eq!(alert.reason, AlertReason::ManualSos);
    assert_eq!(alert.status, AlertStatus::New);
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.vitals.heart_rate, Some(140.0));
}

/// Scenario C: stressed audio at 0.85 with normal vitals
#[tokio::test]
async fn scenario_c_stressed_audio_triggers_auto_stress() {
    let classifier =
        EnsembleClassifier::from_artifact(ModelArtifact::constant_stressed_fixture(0.85))
            .unwrap();
    let pipeline = pipeline("band-01", Some(classifier));

    let mut s = sample("band-01");
    s.vitals = VitalsSample {
        heart_rate: Some(75.0),
        ..Default::default()
    };
    s.audio = Some(tone_clip(1));

    let outcome = pipeline.evaluate(s).await.unwrap();
    let classification = outcome.classification.unwrap();
    assert_eq!(classification.label, StressLabel::Stressed);
    assert!((classification.confidence - 0.85).abs() < 1e-6);

    // 0.85 * 0.6 = 0.51, just over the threshold
    assert!((outcome.score.combined - 0.51).abs() < 1e-6);
    assert!(outcome.score.triggered);
    assert_eq!(outcome.alert.unwrap().reason, AlertReason::AutoStress);
}

/// Scenario D: concurrent triggering evaluations create exactly one alert
#[tokio::test]
async fn scenario_d_concurrent_triggers_create_one_alert() {
    let pipeline = Arc::new(pipeline("band-01", None));

    let mut a = sample("band-01");
    a.manual_trigger = true;
    let mut b = sample("band-01");
    b.manual_trigger = true;

    let (ra, rb) = tokio::join!(
        {
            let p = pipeline.clone();
            async move { p.evaluate(a).await }
        },
        {
            let p = pipeline.clone();
            async move { p.evaluate(b).await }
        }
    );
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    let id_a = ra.alert.as_ref().unwrap().id;
    let id_b = rb.alert.as_ref().unwrap().id;
    assert_eq!(id_a, id_b);
    assert_eq!(
        [ra.alert_created, rb.alert_created]
            .iter()
            .filter(|c| **c)
            .count(),
        1
    );

    let police = Actor::new(Role::Police);
    let alerts = pipeline
        .alerts()
        .alerts_for_device("band-01", &police)
        .unwrap();
    assert_eq!(alerts.len(), 1);
}

/// Scenario E: a guardian cannot resolve
#[tokio::test]
async fn scenario_e_guardian_cannot_resolve() {
    let guardian_id = Uuid::new_v4();
    let registry = Arc::new(DeviceRegistry::with_device(
        "band-01",
        Uuid::new_v4(),
        &[guardian_id],
    ));
    let alerts = Arc::new(AlertLifecycleManager::new(registry));
    let pipeline =
        DistressPipeline::new(EngineConfig::default(), None, alerts.clone()).unwrap();

    let mut s = sample("band-01");
    s.manual_trigger = true;
    let alert = pipeline.evaluate(s).await.unwrap().alert.unwrap();

    let guardian = Actor {
        id: guardian_id,
        role: Role::Guardian,
    };
    assert!(alerts.resolve(alert.id, &guardian, None).is_err());

    let unchanged = alerts.get(alert.id, &guardian).unwrap();
    assert_eq!(unchanged.status, AlertStatus::New);
}

/// Repeated triggers dedup onto the same alert until it is closed
#[tokio::test]
async fn repeated_triggers_dedup_until_closed() {
    let pipeline = pipeline("band-01", None);

    let mut s = sample("band-01");
    s.manual_trigger = true;
    let first = pipeline.evaluate(s.clone()).await.unwrap();
    let second = pipeline.evaluate(s.clone()).await.unwrap();

    assert!(first.alert_created);
    assert!(!second.alert_created);
    assert_eq!(
        first.alert.as_ref().unwrap().id,
        second.alert.as_ref().unwrap().id
    );

    let police = Actor::new(Role::Police);
    pipeline
        .alerts()
        .resolve(first.alert.unwrap().id, &police, None)
        .unwrap();

    let third = pipeline.evaluate(s).await.unwrap();
    assert!(third.alert_created);
}

/// A wedged classifier degrades to unknown instead of stalling evaluation
#[tokio::test]
async fn classification_timeout_degrades_to_unknown() {
    let classifier =
        EnsembleClassifier::from_artifact(ModelArtifact::constant_stressed_fixture(0.99))
            .unwrap();
    let alerts = Arc::new(AlertLifecycleManager::new(registry_for("band-01")));
    let mut config = EngineConfig::default();
    config.classify_timeout_ms = 1;
    let pipeline = DistressPipeline::new(config, Some(classifier), alerts).unwrap();

    let mut s = sample("band-01");
    // A long clip keeps extraction busy well past the 1ms bound
    s.audio = Some(tone_clip(10));

    let outcome = pipeline.evaluate(s).await.unwrap();
    assert_eq!(outcome.classification.unwrap().label, StressLabel::Unknown);
    assert!(!outcome.score.triggered);
}

/// Decision output fires once per created alert, never on dedup
#[tokio::test]
async fn alert_opened_event_fires_once() {
    let (tx, mut rx) = crate::events::channel();
    let pipeline = DistressPipeline::with_registry(
        EngineConfig::default(),
        None,
        registry_for("band-01"),
        tx,
    )
    .unwrap();

    let mut s = sample("band-01");
    s.manual_trigger = true;
    pipeline.evaluate(s.clone()).await.unwrap();
    pipeline.evaluate(s).await.unwrap();

    assert!(matches!(
        rx.try_recv().unwrap(),
        EngineEvent::AlertOpened { .. }
    ));
    assert!(rx.try_recv().is_err());
}
