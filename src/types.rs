pub type AnyResult<T> = anyhow::Result<T>;
