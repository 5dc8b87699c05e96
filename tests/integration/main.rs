//! Integration tests for packd

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use packd::cache::derive_key;
    use packd::specifier::Query;
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn packd() -> Command {
        cargo_bin_cmd!("packd")
    }

    #[test]
    fn help_displays() {
        packd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("npm package specifiers into cached, gzipped browser bundles"));
    }

    #[test]
    fn version_displays() {
        packd()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("packd"));
    }

    #[test]
    fn key_prints_content_address() {
        let expected = derive_key("left-pad", "1.3.0", None, &Query::parse("a=1&b=2"));

        packd()
            .args(["key", "/left-pad@1.3.0?b=2&a=1"])
            .assert()
            .success()
            .stdout(predicate::str::contains(expected.to_string()))
            .stdout(predicate::str::contains("left-pad@1.3.0?a=1&b=2"));
    }

    #[test]
    fn key_rejects_floating_tag() {
        packd()
            .args(["key", "/left-pad@latest"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid tag latest"));
    }

    #[test]
    fn key_rejects_empty_name() {
        packd()
            .args(["key", "/"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid module ID"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("packd.toml");

        packd()
            .args(["--config", path.to_str().unwrap(), "config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("packd.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.toml");

        packd()
            .args(["--config", path.to_str().unwrap(), "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[server]"))
            .stdout(predicate::str::contains("registry.npmjs.org"));
    }

    #[test]
    fn config_init_writes_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("conf").join("packd.toml");

        packd()
            .args(["--config", path.to_str().unwrap(), "config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[build]"));
    }

    #[test]
    fn invalid_config_fails_with_hint() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("packd.toml");
        std::fs::write(&path, "[cache]\nbackend = \"s3\"\n").unwrap();

        packd()
            .args(["--config", path.to_str().unwrap(), "config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn cache_path_uses_configured_dir() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("packd.toml");
        let cache_dir = temp.path().join("bundles");
        std::fs::write(
            &path,
            format!("[cache]\ndir = {:?}\n", cache_dir.to_str().unwrap()),
        )
        .unwrap();

        packd()
            .args(["--config", path.to_str().unwrap(), "cache", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("bundles"));
    }

    #[test]
    fn cache_clear_removes_bundles() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("packd.toml");
        let cache_dir = temp.path().join("bundles");
        std::fs::create_dir_all(cache_dir.join("npm").join("left-pad")).unwrap();
        std::fs::write(
            &path,
            format!("[cache]\ndir = {:?}\n", cache_dir.to_str().unwrap()),
        )
        .unwrap();

        packd()
            .args(["--config", path.to_str().unwrap(), "cache", "clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cleared"));
        assert!(!cache_dir.exists());

        packd()
            .args(["--config", path.to_str().unwrap(), "cache", "clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached bundles to clear."));
    }

    #[test]
    fn serve_without_build_command_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("packd.toml");
        std::fs::write(&path, "[cache]\nbackend = \"memory\"\n").unwrap();

        packd()
            .args(["--config", path.to_str().unwrap(), "serve"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("build.command is empty"));
    }
}

mod server_tests {
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
    use axum::response::Response;
    use axum::Router;
    use flate2::read::GzDecoder;
    use futures_util::future::join_all;
    use packd::build::{BuildInputs, BundleBuilder};
    use packd::cache::{CacheKey, MemoryCacheStore};
    use packd::error::{BuildError, BuildErrorKind, PackdError, PackdResult};
    use packd::orchestration::{BuildCoordinator, InFlightRegistry};
    use packd::registry::{PackageMetadata, RegistryClient};
    use packd::server::{router, AppState};
    use std::collections::BTreeMap;
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use tower::ServiceExt;

    struct FakeRegistry {
        packages: BTreeMap<String, PackageMetadata>,
        calls: AtomicUsize,
    }

    impl FakeRegistry {
        fn new() -> Self {
            let mut packages = BTreeMap::new();
            packages.insert(
                "left-pad".to_string(),
                metadata("left-pad", &["1.2.0", "1.3.0"], "1.3.0"),
            );
            packages.insert(
                "@scope/pkg".to_string(),
                metadata("@scope/pkg", &["2.0.0"], "2.0.0"),
            );
            packages.insert(
                "broken".to_string(),
                metadata("broken", &["0.0.1"], "0.0.1"),
            );
            Self {
                packages,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn metadata(name: &str, versions: &[&str], latest: &str) -> PackageMetadata {
        PackageMetadata {
            name: name.to_string(),
            versions: versions
                .iter()
                .map(|v| (v.to_string(), serde_json::json!({})))
                .collect(),
            dist_tags: [("latest".to_string(), latest.to_string())].into_iter().collect(),
        }
    }

    #[async_trait]
    impl RegistryClient for FakeRegistry {
        async fn fetch_metadata(&self, qualified_name: &str) -> PackdResult<PackageMetadata> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match qualified_name {
                "versionless" => PackageMetadata::from_json(qualified_name, r#"{"name":"versionless"}"#),
                name => self
                    .packages
                    .get(name)
                    .cloned()
                    .ok_or_else(|| PackdError::registry(name, "status code 404")),
            }
        }
    }

    struct FakeBuilder {
        calls: AtomicUsize,
        gate: Arc<Semaphore>,
    }

    impl FakeBuilder {
        fn open() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                gate: Arc::new(Semaphore::new(Semaphore::MAX_PERMITS)),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BundleBuilder for FakeBuilder {
        async fn build(&self, key: &CacheKey, inputs: &BuildInputs) -> PackdResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await.unwrap();
            if inputs.package == "broken" {
                return Err(PackdError::Build(BuildError {
                    kind: BuildErrorKind::Build,
                    package: inputs.package.clone(),
                    version: inputs.version.clone(),
                    key: key.to_string(),
                    message: "Could not resolve \"./missing\"\n  at index.js:1:1".to_string(),
                }));
            }
            Ok(format!(
                "export default \"{}@{}{}\";\n",
                inputs.package,
                inputs.version,
                inputs.query.canonical()
            ))
        }
    }

    struct Harness {
        app: Router,
        registry: Arc<FakeRegistry>,
        builder: Arc<FakeBuilder>,
        store: Arc<MemoryCacheStore>,
    }

    fn harness_with(builder: FakeBuilder) -> Harness {
        let registry = Arc::new(FakeRegistry::new());
        let builder = Arc::new(builder);
        let store = Arc::new(MemoryCacheStore::new());
        let coordinator = BuildCoordinator::new(
            store.clone(),
            builder.clone(),
            Arc::new(InFlightRegistry::new()),
        );

        let mut extra = HeaderMap::new();
        extra.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=31536000, immutable"),
        );

        Harness {
            app: router(AppState::new(registry.clone(), coordinator, extra)),
            registry,
            builder,
            store,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeBuilder::open())
    }

    async fn send(app: &Router, method: &str, uri: &str) -> Response {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app.clone().oneshot(req).await.unwrap()
    }

    async fn body_bytes(resp: Response) -> Vec<u8> {
        axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    fn gunzip(data: &[u8]) -> String {
        let mut out = String::new();
        GzDecoder::new(data).read_to_string(&mut out).unwrap();
        out
    }

    #[tokio::test]
    async fn latest_redirects_to_concrete_version() {
        let h = harness();

        let resp = send(&h.app, "GET", "/left-pad@latest").await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers()[header::LOCATION], "/left-pad@1.3.0");
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(h.builder.calls(), 0);
    }

    #[tokio::test]
    async fn redirect_keeps_subpath_and_sorts_query() {
        let h = harness();

        let resp = send(&h.app, "GET", "/left-pad/lib/index.js?b=2&a").await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(
            resp.headers()[header::LOCATION],
            "/left-pad@1.3.0/lib/index.js?a=true&b=2"
        );
    }

    #[tokio::test]
    async fn scoped_package_redirect() {
        let h = harness();

        let resp = send(&h.app, "GET", "/@scope/pkg@^2").await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers()[header::LOCATION], "/@scope/pkg@2.0.0");
    }

    #[tokio::test]
    async fn concrete_version_serves_gzipped_bundle() {
        let h = harness();

        let resp = send(&h.app, "GET", "/left-pad@1.3.0?min").await;
        assert_eq!(resp.status(), StatusCode::OK);

        let headers = resp.headers().clone();
        assert_eq!(headers[header::CONTENT_TYPE], "application/javascript; charset=utf-8");
        assert_eq!(headers[header::CONTENT_ENCODING], "gzip");
        assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=31536000, immutable");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(headers.contains_key(header::ETAG));

        let body = body_bytes(resp).await;
        assert_eq!(headers[header::CONTENT_LENGTH], body.len().to_string().as_str());
        assert_eq!(gunzip(&body), "export default \"left-pad@1.3.0?min=true\";\n");
        assert_eq!(h.store.len(), 1);
    }

    #[tokio::test]
    async fn repeat_request_served_from_cache() {
        let h = harness();

        let first = send(&h.app, "GET", "/left-pad@1.3.0").await;
        let first_etag = first.headers()[header::ETAG].clone();
        let second = send(&h.app, "GET", "/left-pad@1.3.0").await;

        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(second.headers()[header::ETAG], first_etag);
        assert_eq!(h.builder.calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_requests_build_once() {
        let builder = FakeBuilder {
            calls: AtomicUsize::new(0),
            gate: Arc::new(Semaphore::new(0)),
        };
        let gate = Arc::clone(&builder.gate);
        let h = harness_with(builder);

        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            gate.add_permits(1);
        });

        let responses = join_all((0..10).map(|_| send(&h.app, "GET", "/left-pad@1.2.0"))).await;
        release.await.unwrap();

        assert_eq!(h.builder.calls(), 1);
        let mut bodies = Vec::new();
        for resp in responses {
            assert_eq!(resp.status(), StatusCode::OK);
            bodies.push(body_bytes(resp).await);
        }
        assert!(bodies.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn empty_name_is_bad_request() {
        let h = harness();

        let resp = send(&h.app, "GET", "/").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(h.registry.calls(), 0);
    }

    #[tokio::test]
    async fn trailing_slash_is_bad_request() {
        let h = harness();

        for uri in ["/left-pad/", "/left-pad@1.3.0/"] {
            let resp = send(&h.app, "GET", uri).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
        assert_eq!(h.registry.calls(), 0);
        assert_eq!(h.builder.calls(), 0);
    }

    #[tokio::test]
    async fn redirect_keeps_first_query_value() {
        let h = harness();

        let resp = send(&h.app, "GET", "/left-pad@~1.2?b=x=y&=orphan").await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers()[header::LOCATION], "/left-pad@1.2.0?=orphan&b=x");
    }

    #[tokio::test]
    async fn unsupported_method_has_no_side_effects() {
        let h = harness();

        for method in ["POST", "PUT", "DELETE"] {
            let resp = send(&h.app, method, "/left-pad@1.3.0").await;
            assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        }

        assert_eq!(h.registry.calls(), 0);
        assert_eq!(h.builder.calls(), 0);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn options_preflight() {
        let h = harness();

        let resp = send(&h.app, "OPTIONS", "/anything").await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_METHODS], "GET");
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_MAX_AGE], "3600");
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(body_bytes(resp).await.is_empty());
        assert_eq!(h.registry.calls(), 0);
    }

    #[tokio::test]
    async fn registry_and_metadata_errors_are_bad_requests() {
        let h = harness();

        for uri in ["/no-such-package", "/versionless", "/left-pad@nightly"] {
            let resp = send(&h.app, "GET", uri).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
        assert_eq!(h.builder.calls(), 0);
    }

    #[tokio::test]
    async fn build_failure_is_server_error_and_not_cached() {
        let h = harness();

        let resp = send(&h.app, "GET", "/broken@0.0.1").await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = String::from_utf8(body_bytes(resp).await).unwrap();
        assert!(body.contains("broken@0.0.1"));
        assert!(!body.contains('\n'));
        assert!(h.store.is_empty());

        // A fresh request is a fresh attempt
        let resp = send(&h.app, "GET", "/broken@0.0.1").await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(h.builder.calls(), 2);
    }
}
