use lesson_portal::{
    error::ValidationError,
    storage::{MediaKind, MockStorageService, S3StorageClient, StorageService, media_object_key},
};

#[cfg(test)]
mod media_kind_tests {
    use super::*;

    #[test]
    fn test_accepts_pdf_and_video() {
        assert_eq!(
            MediaKind::from_content_type("application/pdf"),
            Ok(MediaKind::Pdf)
        );
        assert_eq!(MediaKind::from_content_type("video/mp4"), Ok(MediaKind::Video));
        assert_eq!(
            MediaKind::from_content_type(" Video/WebM "),
            Ok(MediaKind::Video)
        );
    }

    #[test]
    fn test_rejects_other_types() {
        for content_type in ["text/plain", "application/binary", "video/", "image/png", ""] {
            assert_eq!(
                MediaKind::from_content_type(content_type),
                Err(ValidationError::UnsupportedContentType(
                    content_type.to_string()
                )),
                "{content_type:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_object_key_layout() {
        let key = media_object_key(MediaKind::Pdf, "Chapitre 1.PDF");
        assert!(key.starts_with("lessons/pdf/"));
        assert!(key.ends_with(".pdf"));

        let key = media_object_key(MediaKind::Video, "cours.mp4");
        assert!(key.starts_with("lessons/video/"));
        assert!(key.ends_with(".mp4"));
    }

    #[test]
    fn test_object_key_drops_client_path() {
        let key = media_object_key(MediaKind::Pdf, "../../etc/passwd");
        assert!(!key.contains(".."));
        assert!(!key.contains("etc"));
        assert!(key.ends_with(".pdf"), "missing extension falls back per kind");

        let key = media_object_key(MediaKind::Video, "clip.m/p4");
        assert!(key.ends_with(".bin"));
        assert_eq!(key.matches('/').count(), 2);
    }

    #[test]
    fn test_object_keys_are_unique() {
        let a = media_object_key(MediaKind::Pdf, "same.pdf");
        let b = media_object_key(MediaKind::Pdf, "same.pdf");
        assert_ne!(a, b);
    }
}

#[cfg(test)]
mod mock_tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_success() {
        let mock = MockStorageService::new();
        let key = media_object_key(MediaKind::Video, "test.mp4");
        let url = mock
            .get_presigned_upload_url(&key, "video/mp4")
            .await
            .unwrap();

        assert!(url.contains("signature=fake"));
        assert!(url.contains(&key));
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let mock = MockStorageService::new_failing();
        let result = mock.get_presigned_upload_url("test.mp4", "video/mp4").await;
        assert!(result.is_err());
    }
}

#[cfg(test)]
mod s3_tests {
    use super::*;

    // Presigning is computed locally; no S3 endpoint needs to be reachable.
    #[tokio::test]
    async fn test_s3_presigned_url_format() {
        let client = S3StorageClient::new(
            "http://localhost:9000",
            "us-east-1",
            "testkey",
            "testsecret",
            "testbucket",
        )
        .await;

        let key = media_object_key(MediaKind::Pdf, "report.pdf");
        let url = client
            .get_presigned_upload_url(&key, "application/pdf")
            .await
            .unwrap();

        assert!(url.contains("localhost:9000"));
        assert!(url.contains("testbucket"));
        assert!(url.contains(&key));
        assert!(url.contains("X-Amz-Expires=600"));
    }

    #[tokio::test]
    async fn test_s3_public_url_is_path_style() {
        let client = S3StorageClient::new(
            "http://localhost:9000/",
            "us-east-1",
            "testkey",
            "testsecret",
            "testbucket",
        )
        .await;

        let key = media_object_key(MediaKind::Video, "cours.mp4");
        assert_eq!(
            client.public_url(&key),
            format!("http://localhost:9000/testbucket/{key}")
        );
    }
}
