use super::remote::{timeout_layer, RemoteStorage};
use anyhow::Result;
use opendal::Operator;

/// 构建 WebDAV 存储。WebDAV 有真实目录，不需要占位对象。
pub async fn build(
    endpoint: &str,
    username: Option<&str>,
    password: Option<&str>,
    root: Option<&str>,
) -> Result<RemoteStorage> {
    use opendal::services::Webdav;

    let mut builder = Webdav::default().endpoint(endpoint);

    if let Some(user) = username {
        builder = builder.username(user);
    }
    if let Some(pass) = password {
        builder = builder.password(pass);
    }
    if let Some(r) = root {
        builder = builder.root(r);
    }

    let operator = Operator::new(builder)?.layer(timeout_layer()).finish();

    let name = format!(
        "webdav://{}{}",
        endpoint.trim_end_matches('/'),
        root.map(|r| format!("/{}", r.trim_start_matches('/')))
            .unwrap_or_default()
    );

    // 某些 WebDAV 服务器需要先创建根目录，已存在时忽略错误
    let _ = operator.create_dir("/").await;

    Ok(RemoteStorage::new(operator, name, true))
}
