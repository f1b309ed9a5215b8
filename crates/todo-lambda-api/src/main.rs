use lambda_runtime::Error;

#[tokio::main]
async fn main() -> Result<(), Error> {
    todo_lambda_api::run().await
}
