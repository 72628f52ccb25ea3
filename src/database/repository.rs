use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::error;
use tokio::time::sleep;
use crate::database::tables::historial::{cargar, create_table_historial, insertar, purgar_expirados};
use crate::database::tables::meta::create_table_meta;
use crate::database::tables::usuarios::{actualizar_rol, bootstrap, create_table_usuarios, eliminar, listar, obtener};
use crate::historial::domain::EventoHistorial;
use crate::roles::domain::{Rol, UsuarioData};
use crate::system::domain::database::WAIT_FOR;
use crate::system::domain::AppError;


const MAX_CONNECTIONS: u32 = 20;


#[derive(Clone, Debug)]
pub struct Repository {
    pool: PgPool,
}

impl Repository {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = create_pool(database_url).await?;
        init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Reintenta la creación hasta que la base esté disponible.
    pub async fn create_repository(database_url: &str) -> Self {
        loop {
            match Self::new(database_url).await {
                Ok(repo) => return repo,
                Err(e) => {
                    error!("Error inicializando repo: {:?}", e);
                    sleep(WAIT_FOR).await;
                }
            }
        }
    }

    // --- Historial ---
    // Los helpers de tabla hablan sqlx; hacia las tareas toda falla sale
    // como `AppError::BaseDatos`.

    pub async fn insertar_evento(&self, evento: &EventoHistorial) -> Result<(), AppError> {
        Ok(insertar(&self.pool, evento).await?)
    }

    pub async fn cargar_historial(&self, limite: i64) -> Result<Vec<EventoHistorial>, AppError> {
        Ok(cargar(&self.pool, limite).await?)
    }

    pub async fn purgar_expirados(&self) -> Result<u64, AppError> {
        Ok(purgar_expirados(&self.pool).await?)
    }

    // --- Usuarios ---

    pub async fn bootstrap_usuario(&self, uid: &str, correo: &str) -> Result<Rol, AppError> {
        Ok(bootstrap(&self.pool, uid, correo).await?)
    }

    pub async fn obtener_usuario(&self, uid: &str) -> Result<Option<UsuarioData>, AppError> {
        Ok(obtener(&self.pool, uid).await?)
    }

    pub async fn listar_usuarios(&self, excluir_uid: &str) -> Result<Vec<UsuarioData>, AppError> {
        Ok(listar(&self.pool, excluir_uid).await?)
    }

    pub async fn actualizar_rol(&self, uid: &str, rol: &str) -> Result<(), AppError> {
        Ok(actualizar_rol(&self.pool, uid, rol).await?)
    }

    pub async fn eliminar_usuario(&self, uid: &str) -> Result<(), AppError> {
        Ok(eliminar(&self.pool, uid).await?)
    }
}


async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect(database_url)
        .await?;

    Ok(pool)
}


async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    create_table_usuarios(pool).await?;
    create_table_meta(pool).await?;
    create_table_historial(pool).await?;
    Ok(())
}
