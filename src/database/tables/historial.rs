use chrono::{Duration, Utc};
use sqlx::{Executor, PgPool};
use crate::historial::domain::EventoHistorial;
use crate::system::domain::historial_const::RETENCION_DIAS;


pub async fn create_table_historial(pool: &PgPool) -> Result<(), sqlx::Error> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS historial_pumpcontrol (
            id          SERIAL PRIMARY KEY,
            fecha       TEXT NOT NULL,
            hora        TEXT NOT NULL,
            tipo        TEXT NOT NULL,
            nombre      TEXT NOT NULL,
            estado      BOOLEAN NOT NULL,
            correo      TEXT NOT NULL,
            rol         TEXT NOT NULL,
            timestamp   BIGINT NOT NULL,
            expire_at   TIMESTAMPTZ NOT NULL
        );
        "#
    )
        .await?;

    Ok(())
}


/// Inserta un registro inmutable con su vencimiento de retención ya fijado.
pub async fn insertar(pool: &PgPool, evento: &EventoHistorial) -> Result<(), sqlx::Error> {
    let expire_at = Utc::now() + Duration::days(RETENCION_DIAS);

    sqlx::query(
        "INSERT INTO historial_pumpcontrol
            (fecha, hora, tipo, nombre, estado, correo, rol, timestamp, expire_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
    )
        .bind(&evento.fecha)
        .bind(&evento.hora)
        .bind(&evento.tipo)
        .bind(&evento.nombre)
        .bind(evento.estado)
        .bind(&evento.correo)
        .bind(&evento.rol)
        .bind(evento.timestamp)
        .bind(expire_at)
        .execute(pool)
        .await?;

    Ok(())
}


/// Los N registros más recientes, entregados en orden ascendente; el
/// llamador los invierte localmente a más-nuevo-primero.
pub async fn cargar(pool: &PgPool, limite: i64) -> Result<Vec<EventoHistorial>, sqlx::Error> {
    sqlx::query_as::<_, EventoHistorial>(
        "SELECT fecha, hora, tipo, nombre, estado, correo, rol, timestamp
         FROM (
             SELECT * FROM historial_pumpcontrol ORDER BY timestamp DESC LIMIT $1
         ) ultimos
         ORDER BY timestamp ASC"
    )
        .bind(limite)
        .fetch_all(pool)
        .await
}


/// Borra los registros que pasaron la ventana de retención.
pub async fn purgar_expirados(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let resultado = sqlx::query("DELETE FROM historial_pumpcontrol WHERE expire_at < NOW()")
        .execute(pool)
        .await?;

    Ok(resultado.rows_affected())
}
