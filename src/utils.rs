use uuid::Uuid;

/// A fresh 32 character lowercase hex id for naming stored objects.
pub fn new_object_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// A client which never routes through a proxy from the environment.
#[cfg(test)]
pub fn direct_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("failed to build http client")
}
