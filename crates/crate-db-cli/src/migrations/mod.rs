//! Demo migration units shipped with the runner.

mod m001_test_migrator_methods;
mod m002_users_strict_document;
mod m003_singletons_dynamic_document;

use crate_db_core::driver::Driver;
use crate_db_core::migration::Doctor;

pub use m001_test_migrator_methods::TestMigratorMethods;
pub use m002_users_strict_document::UsersStrictDocument;
pub use m003_singletons_dynamic_document::SingletonsDynamicDocument;

/// Module the demo units are registered under.
pub const DEMO_MODULE: &str = "demo";

/// Register the demo units.
pub fn register<D: Driver>(doctor: &mut Doctor<D>) {
    doctor
        .register(DEMO_MODULE, "001_test-migrator-methods", TestMigratorMethods)
        .register(DEMO_MODULE, "002_users-strict-document", UsersStrictDocument)
        .register(DEMO_MODULE, "003_singletons-dynamic-document", SingletonsDynamicDocument);
}
