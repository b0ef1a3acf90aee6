#[actix_web::main]
async fn main() -> std::io::Result<()> {
    desa_admin_server::run().await
}
