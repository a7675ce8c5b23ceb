use std::fs;

use micro_message::{
    Environment, ServerRequest, UploadErrorCode, UploadedFile, UploadedFileError, UploadedFiles, normalize_files,
};
use serde_json::json;

#[test]
fn server_upload_moves_exactly_once() {
    let uploads = tempfile::tempdir().unwrap();
    let source = uploads.path().join("php1234");
    fs::write(&source, b"png bytes").unwrap();

    let mut environment = Environment::default();
    environment.server.insert("REQUEST_METHOD".to_owned(), "POST".to_owned());
    environment.files = json!({
        "avatar": {
            "tmp_name": source.to_str().unwrap(),
            "size": 9,
            "error": 0,
            "name": "me.png",
            "type": "image/png"
        }
    });

    let request = ServerRequest::from_environment(environment).unwrap();
    let avatar = request.uploaded_files().get("avatar").and_then(UploadedFiles::as_file).unwrap();
    assert_eq!(avatar.client_media_type_mime(), Some(mime::IMAGE_PNG));
    assert_eq!(avatar.stream().unwrap().to_string(), "png bytes");

    let targets = tempfile::tempdir().unwrap();
    let target = targets.path().join("avatar.png");
    avatar.move_to(&target).unwrap();

    assert!(avatar.is_moved());
    assert!(!source.exists());
    assert_eq!(fs::read(&target).unwrap(), b"png bytes");

    assert!(matches!(avatar.move_to(targets.path().join("again.png")), Err(UploadedFileError::AlreadyMoved)));
    assert!(matches!(avatar.stream(), Err(UploadedFileError::AlreadyMoved)));

    // clones share the moved state
    let clone = request.uploaded_files().files()[0].clone();
    assert!(clone.is_moved());
}

#[test]
fn server_upload_must_still_be_a_regular_file() {
    let uploads = tempfile::tempdir().unwrap();
    let files = normalize_files(&json!({
        "doc": {"tmp_name": uploads.path().join("missing").to_str().unwrap(), "size": 1, "error": 0}
    }))
    .unwrap();

    let doc = files.get("doc").and_then(UploadedFiles::as_file).unwrap();
    assert!(matches!(doc.move_to(uploads.path().join("doc")), Err(UploadedFileError::MoveFailed { .. })));
    assert!(!doc.is_moved());
}

#[test]
fn failed_upload_never_exposes_content() {
    let file = UploadedFile::new(micro_message::Body::from("partial"), 7, 3, Some("a.txt".to_owned()), None).unwrap();
    assert_eq!(file.error(), UploadErrorCode::Partial);

    let target = tempfile::tempdir().unwrap();
    assert!(matches!(
        file.stream(),
        Err(UploadedFileError::UploadError { code: UploadErrorCode::Partial })
    ));
    assert!(matches!(
        file.move_to(target.path().join("a.txt")),
        Err(UploadedFileError::UploadError { code: UploadErrorCode::Partial })
    ));
    assert!(!target.path().join("a.txt").exists());
}

#[test]
fn stream_upload_is_copied_to_target() {
    let content = "x".repeat(micro_message::MOVE_CHUNK_SIZE + 17);
    let file = UploadedFile::new(micro_message::Body::from(content.as_str()), content.len() as u64, 0, None, None)
        .unwrap();

    let target = tempfile::tempdir().unwrap();
    let path = target.path().join("copy.txt");
    file.move_to(&path).unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), content);
    assert!(matches!(file.move_to(&path), Err(UploadedFileError::AlreadyMoved)));
}

#[test]
fn target_directory_must_exist() {
    let file = UploadedFile::new(micro_message::Body::from("x"), 1, 0, None, None).unwrap();
    let root = tempfile::tempdir().unwrap();

    assert!(matches!(
        file.move_to(root.path().join("missing").join("x.txt")),
        Err(UploadedFileError::TargetNotWritable { .. })
    ));
    assert!(matches!(file.move_to(""), Err(UploadedFileError::InvalidArgument { .. })));
    assert!(!file.is_moved());
}
