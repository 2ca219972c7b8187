//! Help output specs

use crate::prelude::*;

#[test]
fn help_lists_the_fencing_commands() {
    admin()
        .args(&["--help"])
        .passes()
        .stdout_has("--fence")
        .stdout_has("--reboot")
        .stdout_has("--unfence")
        .stdout_has("--register-level")
        .stdout_has("--history");
}

#[test]
fn version_is_printed() {
    admin()
        .args(&["--version"])
        .passes()
        .stdout_has("fence-admin");
}
