//! Common test utilities.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// A throwaway project with a populated specs directory.
pub struct TestProject {
    pub temp: tempfile::TempDir,
}

impl TestProject {
    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn specs_dir(&self) -> PathBuf {
        self.temp.path().join("specs")
    }

    pub fn write_spec(&self, name: &str, content: &str) -> PathBuf {
        let path = self.specs_dir().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }
}

/// A project with one spec, one nested spec, and one concept file.
pub fn create_test_project() -> TestProject {
    let temp = tempfile::tempdir().expect("failed to create temp dir");
    let project = TestProject { temp };
    std::fs::create_dir_all(project.specs_dir().join("nested")).unwrap();

    project.write_spec(
        "login.spec",
        "# Customer login\n\
         tags: login, smoke\n\
         \n\
         * open the app\n\
         \n\
         ## Valid credentials\n\
         tags: fast\n\
         * login as \"sue\" with password \"secret\"\n\
         * see the dashboard\n\
         \n\
         ## Locked account\n\
         tags: wip\n\
         * login as \"mallory\" with password \"secret\"\n\
         * see the lockout notice\n",
    );
    project.write_spec(
        "nested/checkout.spec",
        "# Checkout\n\
         \n\
         ## Guest checkout\n\
         * add \"socks\" to the cart\n\
         * pay as a guest\n",
    );
    project.write_spec(
        "auth.cpt",
        "# login as <user> with password <password>\n\
         * enter <user>\n\
         * enter <password>\n\
         * submit the login form\n",
    );
    project
}

/// An empty project: a specs directory with nothing in it.
pub fn create_empty_project() -> TestProject {
    let temp = tempfile::tempdir().expect("failed to create temp dir");
    let project = TestProject { temp };
    std::fs::create_dir_all(project.specs_dir()).unwrap();
    project
}
