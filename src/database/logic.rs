use tokio::time::interval;
use tracing::{error, info};
use crate::context::domain::AppContext;
use crate::system::domain::database::LIMPIEZA_INTERVALO;


/// Purga periódica del historial vencido (el análogo del TTL del almacén).
pub async fn limpieza_task(app_context: AppContext) {

    let mut intervalo = interval(LIMPIEZA_INTERVALO);

    loop {
        intervalo.tick().await;
        match app_context.repo.purgar_expirados().await {
            Ok(0) => {}
            Ok(n) => info!("Info: {n} eventos de historial expirados eliminados"),
            Err(e) => error!("Error: No se pudo purgar el historial. {e}"),
        }
    }
}


pub fn start_limpieza(app_context: AppContext) {

    tokio::spawn(async move {
        limpieza_task(app_context).await;
    });
}
