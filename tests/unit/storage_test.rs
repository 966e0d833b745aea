//! Unit tests for storage helpers

use image_gen_orchestrator::storage::{
    base64, content_type_for_key, is_safe_key, ImageFormat, LocalObjectStorage, ObjectStorage,
    SignedMethod, UrlSigner,
};
use image_gen_orchestrator::AppError;
use std::sync::Arc;
use std::time::Duration;

const PNG_HEADER: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

#[test]
fn test_decode_vendor_payload_and_sniff() {
    let mut png = PNG_HEADER.to_vec();
    png.extend_from_slice(b"pixels");
    let encoded = base64::encode(&png);

    let data_url = format!("data:image/png;base64,{}", encoded);
    let decoded = base64::decode(&data_url).unwrap();
    assert_eq!(decoded, png);
    assert_eq!(ImageFormat::detect(&decoded), Some(ImageFormat::Png));
    assert_eq!(base64::data_url_content_type(&data_url), Some("image/png"));

    // Vendors sometimes wrap long payloads
    let (head, tail) = encoded.split_at(6);
    let wrapped = format!("{}\n{}", head, tail);
    assert_eq!(base64::decode(&wrapped).unwrap(), png);
}

#[test]
fn test_invalid_base64_is_generation_failure() {
    assert!(matches!(
        base64::decode("not valid base64!!!"),
        Err(AppError::GenerationFailed(_))
    ));
}

#[test]
fn test_webp_detection() {
    let mut webp = b"RIFF".to_vec();
    webp.extend_from_slice(&[0, 0, 0, 0]);
    webp.extend_from_slice(b"WEBPVP8 ");
    let format = ImageFormat::detect(&webp).unwrap();
    assert_eq!(format.extension(), "webp");
    assert_eq!(format.content_type(), "image/webp");
}

#[test]
fn test_key_helpers() {
    assert_eq!(content_type_for_key("uploads/2026/10/a.jpeg"), "image/jpeg");
    assert!(is_safe_key("generated/2026/10/inpaint/1-a.png"));
    assert!(!is_safe_key("generated/../../etc"));
}

#[tokio::test]
async fn test_local_storage_presigns_resolvable_urls() {
    let dir = tempfile::tempdir().unwrap();
    let signer = Arc::new(UrlSigner::new("http://blobs.test:9000", "secret").unwrap());
    let storage = LocalObjectStorage::new(dir.path(), signer.clone());

    let put = storage
        .presign_put("uploads/2026/10/x.png", "image/png", Duration::from_secs(300))
        .await
        .unwrap();
    assert_eq!(
        signer.verify_url(SignedMethod::Put, &put).unwrap(),
        "uploads/2026/10/x.png"
    );
    assert!(signer.verify_url(SignedMethod::Get, &put).is_err());

    assert!(matches!(
        storage.presign_get("../x.png", Duration::from_secs(60)).await,
        Err(AppError::InvalidRequest(_))
    ));
}
