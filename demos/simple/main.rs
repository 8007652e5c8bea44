use std::collections::HashMap;

use datafile_manager::global;

pub fn main() {
    env_logger::init();

    let source_key = std::env::var("DATAFILE_SOURCE_KEY").unwrap();
    let manager =
        global::get_or_create(datafile_manager::ManagerConfig::from_source_key(source_key)).unwrap();

    // Block waiting for the first datafile. Until this call returns, every flag evaluates to false.
    manager.wait_for_configuration().unwrap();

    let attributes = HashMap::from([("country".to_owned(), "US".into())]);
    let enabled = manager
        .is_feature_enabled("sale_price", "test-user", Some(&attributes))
        // default value
        .unwrap_or(false);

    println!("sale_price enabled: {:?}", enabled);

    global::reset().unwrap();
}
