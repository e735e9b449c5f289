#![allow(dead_code)]

pub mod templates {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    use phasekit::template::{
        DialectRegistry, MemoryRepository, TagRegistry, TemplateCache, TemplateError,
        TemplatePath, TemplateRepository, TemplateSource,
    };

    /// Repository whose loads of one path stall after reading the source
    pub struct SlowRepository {
        pub inner: Arc<MemoryRepository>,
        slow: TemplatePath,
        delay: Duration,
        loads: AtomicUsize,
    }

    impl SlowRepository {
        pub fn new(inner: Arc<MemoryRepository>, slow: &str, delay: Duration) -> Self {
            Self {
                inner,
                slow: TemplatePath::parse(slow).unwrap(),
                delay,
                loads: AtomicUsize::new(0),
            }
        }

        /// Loads of the slow path so far
        pub fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    impl TemplateRepository for SlowRepository {
        fn exists(&self, path: &TemplatePath) -> bool {
            self.inner.exists(path)
        }

        fn load(&self, path: &TemplatePath) -> Result<TemplateSource, TemplateError> {
            let source = self.inner.load(path)?;
            if *path == self.slow {
                self.loads.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(self.delay);
            }
            Ok(source)
        }

        fn last_modified(&self, path: &TemplatePath) -> Option<SystemTime> {
            self.inner.last_modified(path)
        }

        fn list(&self) -> Vec<TemplatePath> {
            self.inner.list()
        }
    }

    pub fn slow_cache(repo: &Arc<SlowRepository>) -> TemplateCache {
        TemplateCache::new(
            Arc::clone(repo) as Arc<dyn TemplateRepository>,
            Arc::new(TagRegistry::builtin()),
            Arc::new(DialectRegistry::builtin()),
            false,
        )
    }

    /// In-memory repository holding `sources` as `(path, content)` pairs
    pub fn repository(sources: &[(&str, &str)]) -> Arc<MemoryRepository> {
        let repo = Arc::new(MemoryRepository::new());
        for (path, content) in sources {
            repo.insert(path, *content).unwrap();
        }
        repo
    }

    pub fn cache(repo: &Arc<MemoryRepository>, dynamic: bool) -> TemplateCache {
        cache_with_tags(repo, TagRegistry::builtin(), dynamic)
    }

    pub fn cache_with_tags(
        repo: &Arc<MemoryRepository>,
        tags: TagRegistry,
        dynamic: bool,
    ) -> TemplateCache {
        TemplateCache::new(
            Arc::clone(repo) as Arc<dyn TemplateRepository>,
            Arc::new(tags),
            Arc::new(DialectRegistry::builtin()),
            dynamic,
        )
    }
}

pub mod http {
    use phasekit::bridge::HttpBridge;
    use phasekit::dispatcher::Dispatcher;

    /// Serve a GET request through `dispatcher` and return the finished bridge
    pub fn get(dispatcher: &Dispatcher, uri: &str, verbose: bool) -> HttpBridge {
        let request = ::http::Request::get(uri).body(Vec::new()).unwrap();
        serve(dispatcher, &request, verbose)
    }

    /// Serve a urlencoded POST request
    pub fn post_form(dispatcher: &Dispatcher, uri: &str, form: &str) -> HttpBridge {
        let request = ::http::Request::post(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(form.as_bytes().to_vec())
            .unwrap();
        serve(dispatcher, &request, false)
    }

    pub fn serve(
        dispatcher: &Dispatcher,
        request: &::http::Request<Vec<u8>>,
        verbose: bool,
    ) -> HttpBridge {
        let mut bridge = HttpBridge::from_request(request).unwrap();
        dispatcher.serve(&mut bridge, verbose).unwrap();
        bridge
    }

    pub fn body_text(bridge: &HttpBridge) -> String {
        String::from_utf8_lossy(bridge.body()).into_owned()
    }
}
