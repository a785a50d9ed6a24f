use super::remote::{timeout_layer, RemoteStorage};
use anyhow::Result;
use opendal::Operator;

/// 构建 S3 存储，未提供密钥时由 OpenDAL 从环境加载
pub fn build(
    bucket: &str,
    region: &str,
    access_key: Option<&str>,
    secret_key: Option<&str>,
    endpoint: Option<&str>,
    root: Option<&str>,
) -> Result<RemoteStorage> {
    use opendal::services::S3;

    let mut builder = S3::default().bucket(bucket).region(region);

    if let (Some(ak), Some(sk)) = (access_key, secret_key) {
        builder = builder.access_key_id(ak).secret_access_key(sk);
    }
    if let Some(ep) = endpoint {
        builder = builder.endpoint(ep);
    }
    if let Some(r) = root {
        builder = builder.root(r);
    }

    let operator = Operator::new(builder)?.layer(timeout_layer()).finish();

    let name = format!(
        "s3://{}{}",
        bucket,
        root.map(|r| format!("/{}", r.trim_matches('/')))
            .unwrap_or_default()
    );

    Ok(RemoteStorage::new(operator, name, false))
}
