use super::remote::{timeout_layer, RemoteStorage};
use anyhow::Result;
use opendal::Operator;

/// 构建 Azure Blob 容器存储
///
/// 未提供 account key / SAS token 时，由 OpenDAL 从环境中加载凭据
/// （托管标识、工作负载标识等）。
pub fn build(
    account_url: &str,
    container: &str,
    account_name: Option<&str>,
    account_key: Option<&str>,
    sas_token: Option<&str>,
    root: Option<&str>,
) -> Result<RemoteStorage> {
    use opendal::services::Azblob;

    let endpoint = account_url.trim_end_matches('/');
    let mut builder = Azblob::default().endpoint(endpoint).container(container);

    if let Some(name) = account_name {
        builder = builder.account_name(name);
    }
    if let Some(key) = account_key {
        builder = builder.account_key(key);
    }
    if let Some(token) = sas_token {
        builder = builder.sas_token(token);
    }
    if let Some(r) = root {
        builder = builder.root(r);
    }

    let operator = Operator::new(builder)?.layer(timeout_layer()).finish();

    let name = format!(
        "azblob://{}/{}{}",
        endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://"),
        container,
        root.map(|r| format!("/{}", r.trim_matches('/')))
            .unwrap_or_default()
    );

    Ok(RemoteStorage::new(operator, name, false))
}
