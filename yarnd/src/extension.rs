//! In-process extensions.
//!
//! An extension bundles additional scope controllers and output drivers.
//! Extensions are plain Rust values handed to the loader (there is no
//! stable ABI to pull them out of shared objects); loading registers their
//! pieces, unloading removes them again. Built-in scopes and drivers are
//! protected: an extension that collides with one fails to load, and
//! whatever it had registered up to that point is rolled back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::io::{Drivers, OutputDriver};
use crate::scopes::ScopeController;

pub struct Extension {
    pub name: String,
    pub scopes: Vec<Arc<dyn ScopeController>>,
    pub output_drivers: Vec<Arc<dyn OutputDriver>>,
}

struct LoadedExtension {
    scopes: Vec<String>,
    output_drivers: Vec<String>,
}

pub struct ExtensionLoader {
    dispatcher: Arc<Dispatcher>,
    drivers: Arc<Drivers>,
    loaded: Mutex<HashMap<String, LoadedExtension>>,
}

impl ExtensionLoader {
    pub fn new(dispatcher: Arc<Dispatcher>, drivers: Arc<Drivers>) -> ExtensionLoader {
        ExtensionLoader {
            dispatcher,
            drivers,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Registers everything the extension carries. All or nothing: a name
    /// collision rolls back the pieces already registered.
    pub fn load(&self, extension: Extension) -> Result<()> {
        let mut loaded = self.loaded.lock().unwrap();
        if loaded.contains_key(&extension.name) {
            return Err(Error::Conflict(format!(
                "extension '{}' is already loaded",
                extension.name
            )));
        }

        let mut record = LoadedExtension {
            scopes: Vec::new(),
            output_drivers: Vec::new(),
        };

        for scope in &extension.scopes {
            if let Err(error) = self.dispatcher.register_scope(Arc::clone(scope)) {
                self.rollback(&record);
                return Err(error);
            }
            record.scopes.push(scope.name().to_string());
        }

        for driver in &extension.output_drivers {
            if let Err(error) = self.drivers.register_output(Arc::clone(driver)) {
                self.rollback(&record);
                return Err(error);
            }
            record.output_drivers.push(driver.name().to_string());
        }

        tracing::info!(
            extension = extension.name,
            scopes = record.scopes.len(),
            output_drivers = record.output_drivers.len(),
            "Extension loaded."
        );
        loaded.insert(extension.name, record);
        Ok(())
    }

    /// Unregisters everything a previously loaded extension carries.
    pub fn unload(&self, name: &str) -> Result<()> {
        let record = self
            .loaded
            .lock()
            .unwrap()
            .remove(name)
            .ok_or_else(|| Error::NotFound(format!("extension '{name}' is not loaded")))?;

        self.rollback(&record);
        tracing::info!(extension = name, "Extension unloaded.");
        Ok(())
    }

    fn rollback(&self, record: &LoadedExtension) {
        for scope in &record.scopes {
            self.dispatcher.unregister_scope(scope);
        }
        for driver in &record.output_drivers {
            self.drivers.unregister_output(driver);
        }
    }
}
