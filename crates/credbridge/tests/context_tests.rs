//! Provider context lifecycle against an in-process host

use credbridge::provider::ffi::{self, OSSL_provider_init_fn, OSSL_DISPATCH};
use credbridge::{Error, LibraryHost, ProviderConfig, ProviderContext, Result};
use rstest::rstest;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::ptr;
use std::rc::Rc;

/// Step at which the host refuses to continue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailAt {
    NewContext,
    AddBuiltin,
    LoadBaseline,
    LoadNative,
}

#[derive(Debug)]
struct Loaded {
    name: String,
    table: *const OSSL_DISPATCH,
    provctx: *mut c_void,
}

/// Runs built-in providers in process and records every lifecycle call
#[derive(Default)]
struct RecordingHost {
    log: Rc<RefCell<Vec<String>>>,
    builtins: RefCell<HashMap<String, OSSL_provider_init_fn>>,
    fail_at: Option<FailAt>,
}

impl RecordingHost {
    fn failing(fail_at: FailAt) -> Self {
        Self {
            fail_at: Some(fail_at),
            ..Self::default()
        }
    }

    fn fails(&self, step: FailAt) -> bool {
        self.fail_at == Some(step)
    }

    fn record(&self, entry: String) {
        self.log.borrow_mut().push(entry);
    }
}

impl LibraryHost for RecordingHost {
    type LibraryContext = u32;
    type Provider = Loaded;

    fn new_library_context(&self) -> Result<u32> {
        if self.fails(FailAt::NewContext) {
            return Err(Error::Host("new context".to_string()));
        }
        self.record("new".to_string());
        Ok(7)
    }

    fn add_builtin(&self, context: &u32, name: &str, init: OSSL_provider_init_fn) -> Result<()> {
        assert_eq!(*context, 7);
        if self.fails(FailAt::AddBuiltin) {
            return Err(Error::Host("add builtin".to_string()));
        }
        self.builtins.borrow_mut().insert(name.to_string(), init);
        self.record(format!("add {}", name));
        Ok(())
    }

    fn load_provider(&self, _context: &u32, name: &str) -> Result<Loaded> {
        let builtin = self.builtins.borrow().get(name).copied();
        let step = if builtin.is_some() {
            FailAt::LoadNative
        } else {
            FailAt::LoadBaseline
        };
        if self.fails(step) {
            return Err(Error::Host(format!("load {}", name)));
        }

        let mut table: *const OSSL_DISPATCH = ptr::null();
        let mut provctx: *mut c_void = ptr::null_mut();
        if let Some(init) = builtin {
            let status = unsafe { init(ptr::null(), ptr::null(), &mut table, &mut provctx) };
            assert_eq!(status, 1);
            assert!(!table.is_null());
            assert!(!provctx.is_null());
        }
        self.record(format!("load {}", name));
        Ok(Loaded {
            name: name.to_string(),
            table,
            provctx,
        })
    }

    fn unload_provider(&self, provider: Loaded) {
        if !provider.table.is_null() {
            let mut entry = provider.table;
            loop {
                let dispatch = unsafe { *entry };
                if dispatch.function_id == 0 {
                    break;
                }
                if dispatch.function_id == ffi::OSSL_FUNC_PROVIDER_TEARDOWN {
                    let function = dispatch.function.unwrap();
                    let teardown: unsafe extern "C" fn(*mut c_void) =
                        unsafe { std::mem::transmute(function) };
                    unsafe { teardown(provider.provctx) };
                    self.record(format!("teardown {}", provider.name));
                }
                entry = unsafe { entry.add(1) };
            }
        }
        self.record(format!("unload {}", provider.name));
    }

    fn free_library_context(&self, context: u32) {
        assert_eq!(context, 7);
        self.record("free".to_string());
    }
}

#[test]
fn test_create_and_teardown_order() {
    let host = RecordingHost::default();
    let log = Rc::clone(&host.log);

    let context = ProviderContext::create(host, &ProviderConfig::default()).unwrap();
    assert_eq!(*context.library_context(), 7);
    assert_eq!(
        *log.borrow(),
        vec!["new", "add cng_provider", "load default", "load cng_provider"]
    );

    drop(context);
    assert_eq!(
        log.borrow()[4..],
        [
            "teardown cng_provider",
            "unload cng_provider",
            "unload default",
            "free"
        ]
    );
}

#[test]
fn test_configured_names() {
    let host = RecordingHost::default();
    let log = Rc::clone(&host.log);
    let config = ProviderConfig::new()
        .with_provider_name("native")
        .with_baseline_provider("base");

    drop(ProviderContext::create(host, &config).unwrap());
    assert_eq!(
        *log.borrow(),
        vec![
            "new",
            "add native",
            "load base",
            "load native",
            "teardown native",
            "unload native",
            "unload base",
            "free"
        ]
    );
}

#[rstest]
#[case(FailAt::NewContext, vec![])]
#[case(FailAt::AddBuiltin, vec!["new", "free"])]
#[case(FailAt::LoadBaseline, vec!["new", "add cng_provider", "free"])]
#[case(
    FailAt::LoadNative,
    vec!["new", "add cng_provider", "load default", "unload default", "free"]
)]
fn test_partial_failure_releases_acquired(#[case] fail_at: FailAt, #[case] expected: Vec<&str>) {
    let host = RecordingHost::failing(fail_at);
    let log = Rc::clone(&host.log);

    let result = ProviderContext::create(host, &ProviderConfig::default());
    assert!(matches!(result, Err(Error::Host(_))));
    assert_eq!(*log.borrow(), expected);
}
