fn main() {
    // Tell cargo to recompile when these compile-time env vars change.
    // Without this, option_env!() values get cached and won't update.
    println!("cargo:rerun-if-env-changed=FORKFUL_FIREBASE_PACKAGE");
    println!("cargo:rerun-if-env-changed=FORKFUL_FIREBASE_CERT_SHA1");
    println!("cargo:rerun-if-env-changed=FORKFUL_FIREBASE_API_KEY");
    println!("cargo:rerun-if-env-changed=FORKFUL_FIREBASE_PROJECT_ID");
    println!("cargo:rerun-if-env-changed=FORKFUL_FIREBASE_PROJECT_NUMBER");
    println!("cargo:rerun-if-env-changed=FORKFUL_FIREBASE_APP_ID");
    println!("cargo:rerun-if-env-changed=FORKFUL_DEFAULT_BASE_URL");
}
