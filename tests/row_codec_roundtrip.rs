//! Row Codec Round-Trip Tests
//!
//! Invariants:
//! - A row that builds and serializes decodes back equal in every field
//!   value, system field and nil marker
//! - Build errors aggregate, the caller sees every problem in one pass
//! - Verifiable fields accept only tokens issued for exactly that field
//! - Truncation and corruption fail loudly, never silently misparse

use std::sync::Arc;

use chrono::Duration;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use emberdb::app::AppConfig;
use emberdb::names::QName;
use emberdb::record::RecordId;
use emberdb::row::{load_row, store_row, RowError, Value};
use emberdb::schema::{DataKind, FieldDef, Schemas, TypeDef, TypeKind};
use emberdb::storage::MemStorage;
use emberdb::tokens::{JwtVerifier, TokenVerifier, VerificationKind, VerifiedValue};

// =============================================================================
// Helper Functions
// =============================================================================

fn test_schemas() -> Schemas {
    let mut schemas = Schemas::new();
    schemas
        .add_type(
            TypeDef::new(QName::new("test", "cmd"), TypeKind::Object)
                .with_field(FieldDef::required("a", DataKind::Int32))
                .with_field(FieldDef::optional("note", DataKind::String).with_max_len(16))
                .with_field(FieldDef::optional("big", DataKind::Int64))
                .with_field(FieldDef::optional("ratio", DataKind::Float64))
                .with_field(FieldDef::optional("flag", DataKind::Bool))
                .with_field(FieldDef::optional("blob", DataKind::Bytes))
                .with_field(FieldDef::optional("target", DataKind::RecordId))
                .with_field(FieldDef::optional("kind", DataKind::QName)),
        )
        .unwrap();
    schemas
        .add_type(
            TypeDef::new(QName::new("test", "user"), TypeKind::Doc)
                .with_field(
                    FieldDef::required("email", DataKind::String)
                        .verified(VerificationKind::Email),
                )
                .with_field(FieldDef::optional("name", DataKind::String)),
        )
        .unwrap();
    schemas
}

fn prepared_config() -> AppConfig {
    let mut storage = MemStorage::new();
    let cfg = AppConfig::new(test_schemas()).unwrap();
    cfg.prepare(&mut storage).unwrap();
    cfg
}

fn prepared_config_with_verifier(verifier: Arc<dyn TokenVerifier>) -> AppConfig {
    let mut storage = MemStorage::new();
    let cfg = AppConfig::new(test_schemas())
        .unwrap()
        .with_verifier(verifier);
    cfg.prepare(&mut storage).unwrap();
    cfg
}

// =============================================================================
// The test.cmd Scenario
// =============================================================================

/// Building without the required int32 field "a" fails with a
/// name-not-found class error.
#[test]
fn test_missing_required_field_is_name_not_found() {
    let cfg = prepared_config();
    let row = cfg.new_row(&QName::new("test", "cmd")).unwrap();
    let errs = row.build().unwrap_err();
    let text = format!("{}", errs);
    assert!(text.contains("name not found"));
    assert!(text.contains("'a'"));
}

/// Setting "a" to a string instead of a number fails with a wrong-type
/// class error.
#[test]
fn test_wrong_value_kind_is_wrong_type() {
    let cfg = prepared_config();
    let mut row = cfg.new_row(&QName::new("test", "cmd")).unwrap();
    row.set("a", Value::from("seven"));
    let errs = row.build().unwrap_err();
    let text = format!("{}", errs);
    assert!(text.contains("wrong type"));
    assert!(text.contains("'a'"));
}

/// Setting a=7, serializing and decoding yields a row where the value is
/// 7 and present.
#[test]
fn test_set_store_load_scenario() {
    let cfg = prepared_config();
    let mut row = cfg.new_row(&QName::new("test", "cmd")).unwrap();
    row.set_int32("a", 7);

    let bytes = store_row(&row, &cfg).unwrap();
    let back = load_row(&bytes, &cfg).unwrap();
    assert_eq!(back.as_int32("a"), 7);
    assert!(back.has_value("a"));
}

// =============================================================================
// Aggregated Errors
// =============================================================================

/// Three invalid fields produce one error carrying all three problems.
#[test]
fn test_three_invalid_fields_reported_together() {
    let cfg = prepared_config();
    let mut row = cfg.new_row(&QName::new("test", "cmd")).unwrap();
    row.set("a", Value::from("not a number"));
    row.set_string("note", "this note is longer than sixteen bytes");
    row.set("nosuchfield", Value::Bool(true));

    let errs = row.build().unwrap_err();
    assert_eq!(errs.len(), 3);
    let text = format!("{}", errs);
    assert!(text.contains("'a'"));
    assert!(text.contains("'note'"));
    assert!(text.contains("'nosuchfield'"));
}

// =============================================================================
// Round-Trip Equality
// =============================================================================

#[test]
fn test_full_roundtrip_equality() {
    let cfg = prepared_config();
    let mut row = cfg.new_row(&QName::new("test", "cmd")).unwrap();
    row.set_int32("a", -12);
    row.set_string("note", "noted");
    row.set_int64("big", i64::MIN + 1);
    row.set_float64("ratio", 0.25);
    row.set_bool("flag", true);
    row.set_bytes("blob", vec![0, 1, 2, 255]);
    row.set_record_id("target", RecordId::from_parts(7, 9));
    row.set_qname("kind", QName::new("test", "user"));

    let bytes = store_row(&row, &cfg).unwrap();
    let back = load_row(&bytes, &cfg).unwrap();
    assert_eq!(back, row);
}

#[test]
fn test_nil_markers_survive_roundtrip() {
    let cfg = prepared_config();
    let mut row = cfg.new_row(&QName::new("test", "cmd")).unwrap();
    row.set_int32("a", 1);
    row.set_string("note", "");
    row.set_bytes("blob", Vec::new());

    let bytes = store_row(&row, &cfg).unwrap();
    let back = load_row(&bytes, &cfg).unwrap();
    assert_eq!(back, row);
    assert!(back.is_nil("note"));
    assert!(back.is_nil("blob"));
    assert!(!back.is_nil("big"));
    assert!(!back.has_value("note"));
}

/// Generated values survive the round trip, whatever they are.
#[test]
fn test_generated_roundtrips() {
    let cfg = prepared_config();
    let mut rng = StdRng::seed_from_u64(0x0E17B);

    for _ in 0..64 {
        let mut row = cfg.new_row(&QName::new("test", "cmd")).unwrap();
        row.set_int32("a", rng.gen());
        if rng.gen_bool(0.5) {
            row.set_int64("big", rng.gen());
        }
        if rng.gen_bool(0.5) {
            row.set_float64("ratio", rng.gen::<f64>());
        }
        if rng.gen_bool(0.5) {
            let len = rng.gen_range(0..12);
            let s: String = (0..len).map(|_| rng.gen_range('a'..='z')).collect();
            row.set_string("note", s);
        }
        if rng.gen_bool(0.5) {
            let len = rng.gen_range(0..32);
            let blob: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            row.set_bytes("blob", blob);
        }

        let bytes = store_row(&row, &cfg).unwrap();
        let back = load_row(&bytes, &cfg).unwrap();
        assert_eq!(back, row);
    }
}

// =============================================================================
// Verifiable Fields
// =============================================================================

#[test]
fn test_verified_field_accepts_matching_token() {
    let verifier = Arc::new(JwtVerifier::new(b"secret", "emberdb-test"));
    let cfg = prepared_config_with_verifier(verifier.clone());

    let token = verifier
        .issue(
            &VerifiedValue {
                entity: QName::new("test", "user"),
                field: "email".to_string(),
                kind: VerificationKind::Email,
                value: "alice@example.com".to_string(),
            },
            Duration::minutes(5),
        )
        .unwrap();

    let mut row = cfg.new_row(&QName::new("test", "user")).unwrap();
    row.set_string("email", token);
    assert!(row.build().is_ok());
    // the stored value is the decoded payload, not the token
    assert_eq!(row.as_string("email"), "alice@example.com");
}

#[test]
fn test_verified_field_rejects_plain_string() {
    let verifier = Arc::new(JwtVerifier::new(b"secret", "emberdb-test"));
    let cfg = prepared_config_with_verifier(verifier);

    let mut row = cfg.new_row(&QName::new("test", "user")).unwrap();
    row.set_string("email", "alice@example.com");
    let errs = row.build().unwrap_err();
    assert!(format!("{}", errs).contains("token verification failed"));
}

#[test]
fn test_verified_field_rejects_token_for_other_field() {
    let verifier = Arc::new(JwtVerifier::new(b"secret", "emberdb-test"));
    let cfg = prepared_config_with_verifier(verifier.clone());

    let token = verifier
        .issue(
            &VerifiedValue {
                entity: QName::new("test", "user"),
                field: "name".to_string(),
                kind: VerificationKind::Email,
                value: "alice@example.com".to_string(),
            },
            Duration::minutes(5),
        )
        .unwrap();

    let mut row = cfg.new_row(&QName::new("test", "user")).unwrap();
    row.set_string("email", token);
    let errs = row.build().unwrap_err();
    assert!(format!("{}", errs).contains("token verification failed"));
}

// =============================================================================
// Corruption Handling
// =============================================================================

#[test]
fn test_every_truncation_fails_loudly() {
    let cfg = prepared_config();
    let mut row = cfg.new_row(&QName::new("test", "cmd")).unwrap();
    row.set_int32("a", 7);
    row.set_string("note", "payload");
    let bytes = store_row(&row, &cfg).unwrap();

    for cut in 0..bytes.len() {
        assert!(
            load_row(&bytes[..cut], &cfg).is_err(),
            "truncation at {} must not decode",
            cut
        );
    }
}

#[test]
fn test_flipped_payload_byte_fails_checksum() {
    let cfg = prepared_config();
    let mut row = cfg.new_row(&QName::new("test", "cmd")).unwrap();
    row.set_int32("a", 7);
    let mut bytes = store_row(&row, &cfg).unwrap();

    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    match load_row(&bytes, &cfg) {
        Err(RowError::Decode(_)) => {}
        other => panic!("expected a decode error, got {:?}", other.map(|_| ())),
    }
}
